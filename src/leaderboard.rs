use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::atlas_score::{ScoreBreakdown, Tier, calculate_atlas_score};
use crate::kingdom_stats::{KingdomProfile, KingdomStats, extract_stats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub kingdom_number: u32,
    pub stats: KingdomStats,
    pub score: ScoreBreakdown,
    /// Score the database reported, if any, for drift checks.
    pub stored_score: Option<f64>,
}

impl LeaderboardEntry {
    pub fn score_drift(&self) -> Option<f64> {
        self.stored_score.map(|s| self.score.final_score - s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub counts: BTreeMap<Tier, usize>,
    pub total: usize,
}

impl TierSummary {
    pub fn count(&self, tier: Tier) -> usize {
        self.counts.get(&tier).copied().unwrap_or(0)
    }

    pub fn share(&self, tier: Tier) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(tier) as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaderboardFilter {
    pub tier: Option<Tier>,
    pub min_kvks: u32,
    pub limit: Option<usize>,
}

/// Scores every profile and ranks them. Ties on score break on more KvKs
/// played, then lower kingdom number; equal scores share the same rank.
pub fn build_leaderboard(profiles: &[KingdomProfile]) -> Vec<LeaderboardEntry> {
    let mut rows = profiles
        .par_iter()
        .map(|p| {
            let stats = extract_stats(p);
            let score = calculate_atlas_score(&stats);
            LeaderboardEntry {
                rank: 0,
                kingdom_number: p.kingdom_number,
                stats,
                score,
                stored_score: p.atlas_score,
            }
        })
        .collect::<Vec<_>>();

    rows.sort_by(|a, b| {
        b.score
            .final_score
            .total_cmp(&a.score.final_score)
            .then(b.stats.total_kvks.cmp(&a.stats.total_kvks))
            .then(a.kingdom_number.cmp(&b.kingdom_number))
    });

    let mut prev_score: Option<f64> = None;
    let mut rank = 0usize;
    for (idx, row) in rows.iter_mut().enumerate() {
        if prev_score != Some(row.score.final_score) {
            rank = idx + 1;
            prev_score = Some(row.score.final_score);
        }
        row.rank = rank;
    }
    rows
}

pub fn filter_leaderboard<'a>(
    rows: &'a [LeaderboardEntry],
    filter: &LeaderboardFilter,
) -> Vec<&'a LeaderboardEntry> {
    rows.iter()
        .filter(|r| filter.tier.is_none_or(|t| r.score.tier == t))
        .filter(|r| r.stats.total_kvks >= filter.min_kvks)
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect()
}

pub fn tier_summary(rows: &[LeaderboardEntry]) -> TierSummary {
    let mut counts: BTreeMap<Tier, usize> = Tier::ALL.iter().map(|t| (*t, 0)).collect();
    for row in rows {
        *counts.entry(row.score.tier).or_insert(0) += 1;
    }
    TierSummary {
        counts,
        total: rows.len(),
    }
}

pub fn find_entry(rows: &[LeaderboardEntry], kingdom_number: u32) -> Option<&LeaderboardEntry> {
    rows.iter().find(|r| r.kingdom_number == kingdom_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(n: u32, prep: (u32, u32), battle: (u32, u32)) -> KingdomProfile {
        KingdomProfile {
            kingdom_number: n,
            prep_wins: Some(prep.0),
            prep_losses: Some(prep.1),
            battle_wins: Some(battle.0),
            battle_losses: Some(battle.1),
            ..Default::default()
        }
    }

    #[test]
    fn ranks_by_score_with_shared_ranks() {
        let rows = build_leaderboard(&[
            profile(3, (2, 2), (2, 2)),
            profile(1, (9, 1), (9, 1)),
            profile(2, (2, 2), (2, 2)),
            profile(4, (0, 0), (0, 0)),
        ]);
        let order = rows.iter().map(|r| r.kingdom_number).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 3, 4]);
        let ranks = rows.iter().map(|r| r.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 2, 4]);
    }

    #[test]
    fn filter_and_summary() {
        let rows = build_leaderboard(&[
            profile(1, (10, 0), (10, 0)),
            profile(2, (1, 9), (1, 9)),
            profile(3, (0, 0), (0, 0)),
        ]);
        let summary = tier_summary(&rows);
        assert_eq!(summary.total, 3);
        assert_eq!(Tier::ALL.iter().map(|t| summary.count(*t)).sum::<usize>(), 3);
        assert_eq!(summary.count(Tier::C), 2);

        let c_only = filter_leaderboard(
            &rows,
            &LeaderboardFilter {
                tier: Some(Tier::C),
                min_kvks: 1,
                limit: None,
            },
        );
        assert_eq!(c_only.len(), 1);
        assert_eq!(c_only[0].kingdom_number, 2);

        let top = filter_leaderboard(
            &rows,
            &LeaderboardFilter {
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(top[0].kingdom_number, 1);
        assert!(find_entry(&rows, 3).is_some());
    }

    #[test]
    fn drift_against_stored_score() {
        let mut p = profile(7, (5, 5), (5, 5));
        p.atlas_score = Some(4.0);
        let rows = build_leaderboard(&[p]);
        let drift = rows[0].score_drift().unwrap();
        assert!((drift - (rows[0].score.final_score - 4.0)).abs() < 1e-12);
    }
}
