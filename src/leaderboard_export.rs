use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::atlas_score::Tier;
use crate::kingdom_stats::KvkOutcome;
use crate::leaderboard::{LeaderboardEntry, tier_summary};
use crate::prediction::predict_outcomes;

pub struct ExportReport {
    pub kingdoms: usize,
    pub prediction_rows: usize,
}

enum CellValue {
    Text(String),
    Number(f64),
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Number(f64::from(v))
    }
}

impl From<usize> for CellValue {
    fn from(v: usize) -> Self {
        CellValue::Number(v as f64)
    }
}

/// Writes the leaderboard, per-kingdom outcome projections and the tier
/// distribution to an xlsx workbook.
pub fn export_leaderboard(path: &Path, rows: &[LeaderboardEntry]) -> Result<ExportReport> {
    let mut leaderboard_rows: Vec<Vec<CellValue>> = vec![header(&[
        "Rank",
        "Kingdom",
        "Tier",
        "Atlas Score",
        "KvKs",
        "Prep W-L",
        "Battle W-L",
        "Prep Rate",
        "Battle Rate",
        "Dominations",
        "Invasions",
        "Prep Streak",
        "Battle Streak",
        "Recent",
    ])];
    for row in rows {
        leaderboard_rows.push(leaderboard_row(row));
    }

    let mut prediction_rows: Vec<Vec<CellValue>> = vec![header(&[
        "Kingdom",
        "Outcome",
        "Probability",
        "Projected Score",
        "Change",
        "New Tier",
        "Tier Change",
    ])];
    for row in rows {
        let set = predict_outcomes(&row.stats, None);
        for p in &set.predictions {
            prediction_rows.push(vec![
                row.kingdom_number.into(),
                p.outcome.label().into(),
                p.probability.into(),
                p.projected_score.into(),
                p.score_change.into(),
                p.new_tier.label().into(),
                if p.tier_change { "yes" } else { "no" }.into(),
            ]);
        }
    }

    let summary = tier_summary(rows);
    let mut tier_rows: Vec<Vec<CellValue>> = vec![header(&["Tier", "Min Score", "Kingdoms", "Share"])];
    for tier in Tier::ALL {
        tier_rows.push(vec![
            tier.label().into(),
            tier.min_score().into(),
            summary.count(tier).into(),
            summary.share(tier).into(),
        ]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Leaderboard")?;
        write_rows(sheet, &leaderboard_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions")?;
        write_rows(sheet, &prediction_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("TierSummary")?;
        write_rows(sheet, &tier_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        kingdoms: rows.len(),
        prediction_rows: prediction_rows.len().saturating_sub(1),
    })
}

fn header(cols: &[&str]) -> Vec<CellValue> {
    cols.iter().map(|c| CellValue::from(*c)).collect()
}

fn leaderboard_row(row: &LeaderboardEntry) -> Vec<CellValue> {
    let s = &row.stats;
    vec![
        row.rank.into(),
        row.kingdom_number.into(),
        row.score.tier.label().into(),
        row.score.final_score.into(),
        s.total_kvks.into(),
        format!("{}-{}", s.prep_wins, s.prep_losses).into(),
        format!("{}-{}", s.battle_wins, s.battle_losses).into(),
        row.score.prep_win_rate.into(),
        row.score.battle_win_rate.into(),
        s.dominations.into(),
        s.invasions.into(),
        s.current_prep_streak.into(),
        s.current_battle_streak.into(),
        recent_label(&s.recent_outcomes).into(),
    ]
}

fn recent_label(outcomes: &[KvkOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| match o {
            KvkOutcome::Domination => "D",
            KvkOutcome::Reversal => "R",
            KvkOutcome::Comeback => "C",
            KvkOutcome::Invasion => "I",
        })
        .collect::<Vec<_>>()
        .join("")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<CellValue>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match value {
                CellValue::Text(v) => worksheet.write_string(r, c, v),
                CellValue::Number(v) => worksheet.write_number(r, c, *v),
            }
            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kingdom_stats::KingdomProfile;
    use crate::leaderboard::build_leaderboard;

    #[test]
    fn writes_workbook() {
        let rows = build_leaderboard(&[
            KingdomProfile {
                kingdom_number: 1,
                prep_wins: Some(3),
                prep_losses: Some(1),
                battle_wins: Some(2),
                battle_losses: Some(2),
                ..Default::default()
            },
            KingdomProfile {
                kingdom_number: 2,
                ..Default::default()
            },
        ]);
        let path = std::env::temp_dir().join(format!("atlas_export_{}.xlsx", std::process::id()));
        let report = export_leaderboard(&path, &rows).unwrap();
        assert_eq!(report.kingdoms, 2);
        assert_eq!(report.prediction_rows, 8);
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn recent_label_is_compact() {
        assert_eq!(
            recent_label(&[KvkOutcome::Domination, KvkOutcome::Invasion, KvkOutcome::Comeback]),
            "DIC"
        );
    }
}
