use std::cmp::Reverse;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RECENT_OUTCOMES_MAX: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseResult {
    Win,
    Loss,
}

impl PhaseResult {
    pub fn is_win(self) -> bool {
        matches!(self, PhaseResult::Win)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(PhaseResult::Win),
            Value::Bool(false) => Some(PhaseResult::Loss),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "w" | "win" | "won" => Some(PhaseResult::Win),
                "l" | "loss" | "lost" | "lose" => Some(PhaseResult::Loss),
                _ => None,
            },
            _ => None,
        }
    }
}

/// The four (prep, battle) result combinations of a single KvK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KvkOutcome {
    Domination,
    Reversal,
    Comeback,
    Invasion,
}

impl KvkOutcome {
    /// Prep-outer enumeration of {win, loss} x {win, loss}.
    pub const ALL: [KvkOutcome; 4] = [
        KvkOutcome::Domination,
        KvkOutcome::Reversal,
        KvkOutcome::Comeback,
        KvkOutcome::Invasion,
    ];

    pub fn from_phases(prep: PhaseResult, battle: PhaseResult) -> Self {
        match (prep.is_win(), battle.is_win()) {
            (true, true) => KvkOutcome::Domination,
            (true, false) => KvkOutcome::Reversal,
            (false, true) => KvkOutcome::Comeback,
            (false, false) => KvkOutcome::Invasion,
        }
    }

    pub fn prep_won(self) -> bool {
        matches!(self, KvkOutcome::Domination | KvkOutcome::Reversal)
    }

    pub fn battle_won(self) -> bool {
        matches!(self, KvkOutcome::Domination | KvkOutcome::Comeback)
    }

    pub fn label(self) -> &'static str {
        match self {
            KvkOutcome::Domination => "Domination",
            KvkOutcome::Reversal => "Reversal",
            KvkOutcome::Comeback => "Comeback",
            KvkOutcome::Invasion => "Invasion",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvkRecord {
    pub kvk_number: Option<u32>,
    pub opponent_kingdom: Option<u32>,
    pub prep_result: Option<PhaseResult>,
    pub battle_result: Option<PhaseResult>,
    pub kvk_date: Option<NaiveDate>,
}

impl KvkRecord {
    pub fn outcome(&self) -> Option<KvkOutcome> {
        let (Some(prep), Some(battle)) = (self.prep_result, self.battle_result) else {
            return None;
        };
        Some(KvkOutcome::from_phases(prep, battle))
    }
}

/// A kingdom row as delivered by the Atlas database. Every counter is optional
/// because rows for freshly tracked kingdoms routinely come back half-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KingdomProfile {
    pub kingdom_number: u32,
    pub total_kvks: Option<u32>,
    pub prep_wins: Option<u32>,
    pub prep_losses: Option<u32>,
    pub battle_wins: Option<u32>,
    pub battle_losses: Option<u32>,
    pub dominations: Option<u32>,
    pub invasions: Option<u32>,
    pub prep_streak: Option<u32>,
    pub battle_streak: Option<u32>,
    pub atlas_score: Option<f64>,
    #[serde(default)]
    pub recent_kvks: Vec<KvkRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KingdomStats {
    pub total_kvks: u32,
    pub prep_wins: u32,
    pub prep_losses: u32,
    pub battle_wins: u32,
    pub battle_losses: u32,
    pub dominations: u32,
    pub invasions: u32,
    pub current_prep_streak: u32,
    pub current_battle_streak: u32,
    /// Most recent first, never longer than [`RECENT_OUTCOMES_MAX`].
    pub recent_outcomes: Vec<KvkOutcome>,
}

impl KingdomStats {
    pub fn prep_decided(&self) -> u32 {
        self.prep_wins.saturating_add(self.prep_losses)
    }

    pub fn battle_decided(&self) -> u32 {
        self.battle_wins.saturating_add(self.battle_losses)
    }
}

pub fn extract_stats(profile: &KingdomProfile) -> KingdomStats {
    let history = ordered_outcomes(&profile.recent_kvks);

    let counters_absent = [
        profile.prep_wins,
        profile.prep_losses,
        profile.battle_wins,
        profile.battle_losses,
    ]
    .iter()
    .all(Option::is_none);

    let (prep_wins, prep_losses, battle_wins, battle_losses) = if counters_absent {
        let prep_wins = count_where(&history, |o| o.prep_won());
        let battle_wins = count_where(&history, |o| o.battle_won());
        let n = history.len() as u32;
        (prep_wins, n - prep_wins, battle_wins, n - battle_wins)
    } else {
        (
            profile.prep_wins.unwrap_or(0),
            profile.prep_losses.unwrap_or(0),
            profile.battle_wins.unwrap_or(0),
            profile.battle_losses.unwrap_or(0),
        )
    };

    let total_kvks = profile
        .total_kvks
        .unwrap_or(0)
        .max(prep_wins.saturating_add(prep_losses))
        .max(battle_wins.saturating_add(battle_losses))
        .max(history.len() as u32);

    let dominations = profile
        .dominations
        .unwrap_or_else(|| count_where(&history, |o| o == KvkOutcome::Domination))
        .min(total_kvks);
    let invasions = profile
        .invasions
        .unwrap_or_else(|| count_where(&history, |o| o == KvkOutcome::Invasion))
        .min(total_kvks - dominations);

    let current_prep_streak = profile
        .prep_streak
        .unwrap_or_else(|| leading_streak(&history, KvkOutcome::prep_won))
        .min(prep_wins);
    let current_battle_streak = profile
        .battle_streak
        .unwrap_or_else(|| leading_streak(&history, KvkOutcome::battle_won))
        .min(battle_wins);

    KingdomStats {
        total_kvks,
        prep_wins,
        prep_losses,
        battle_wins,
        battle_losses,
        dominations,
        invasions,
        current_prep_streak,
        current_battle_streak,
        recent_outcomes: history.into_iter().take(RECENT_OUTCOMES_MAX).collect(),
    }
}

// Numbered entries newest first; unnumbered ones keep input order at the tail.
fn ordered_outcomes(records: &[KvkRecord]) -> Vec<KvkOutcome> {
    let mut valid = records
        .iter()
        .filter_map(|r| r.outcome().map(|o| (r.kvk_number, o)))
        .collect::<Vec<_>>();
    valid.sort_by_key(|(number, _)| Reverse(number.map_or(0, |n| u64::from(n) + 1)));
    valid.into_iter().map(|(_, o)| o).collect()
}

fn count_where(history: &[KvkOutcome], pred: impl Fn(KvkOutcome) -> bool) -> u32 {
    history.iter().filter(|o| pred(**o)).count() as u32
}

fn leading_streak(history: &[KvkOutcome], won: fn(KvkOutcome) -> bool) -> u32 {
    history.iter().take_while(|o| won(**o)).count() as u32
}

pub fn parse_kingdom_profile_json(raw: &str) -> Result<Option<KingdomProfile>> {
    let value: Value = serde_json::from_str(raw).context("invalid kingdom json")?;
    Ok(kingdom_profile_from_value(&value))
}

/// Accepts either a JSON array of kingdom rows or a single row. Entries that
/// are not objects or carry no kingdom number are skipped.
pub fn parse_kingdom_profiles_json(raw: &str) -> Result<Vec<KingdomProfile>> {
    let value: Value = serde_json::from_str(raw).context("invalid kingdoms json")?;
    let rows = match &value {
        Value::Array(items) => items.iter().filter_map(kingdom_profile_from_value).collect(),
        Value::Object(_) => kingdom_profile_from_value(&value).into_iter().collect(),
        _ => Vec::new(),
    };
    Ok(rows)
}

pub fn kingdom_profile_from_value(value: &Value) -> Option<KingdomProfile> {
    if !value.is_object() {
        return None;
    }
    let kingdom_number = pick_count(value, &["kingdom_number", "kingdomNumber", "kingdom"])
        .filter(|n| *n > 0)?;

    let recent_kvks = ["recent_kvks", "recentKvks", "kvk_history", "history"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(kvk_record_from_value).collect())
        .unwrap_or_default();

    Some(KingdomProfile {
        kingdom_number,
        total_kvks: pick_count(value, &["total_kvks", "totalKvks"]),
        prep_wins: pick_count(value, &["prep_wins", "prepWins"]),
        prep_losses: pick_count(value, &["prep_losses", "prepLosses"]),
        battle_wins: pick_count(value, &["battle_wins", "battleWins"]),
        battle_losses: pick_count(value, &["battle_losses", "battleLosses"]),
        dominations: pick_count(value, &["dominations"]),
        invasions: pick_count(value, &["invasions", "defeats"]),
        prep_streak: pick_count(value, &["prep_streak", "prepStreak", "current_prep_streak"]),
        battle_streak: pick_count(
            value,
            &["battle_streak", "battleStreak", "current_battle_streak"],
        ),
        atlas_score: pick_f64(value, &["atlas_score", "atlasScore", "overall_score"]),
        recent_kvks,
    })
}

pub fn kvk_record_from_value(value: &Value) -> Option<KvkRecord> {
    if !value.is_object() {
        return None;
    }
    Some(KvkRecord {
        kvk_number: pick_count(value, &["kvk_number", "kvkNumber", "kvk"]),
        opponent_kingdom: pick_count(value, &["opponent_kingdom", "opponentKingdom", "opponent"])
            .filter(|n| *n > 0),
        prep_result: pick_phase(value, &["prep_result", "prepResult", "prep"]),
        battle_result: pick_phase(value, &["battle_result", "battleResult", "battle"]),
        kvk_date: pick_date(value, &["kvk_date", "kvkDate", "date"]),
    })
}

fn pick_count(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))
        .and_then(count_from_value)
}

// Negative numbers clamp to zero; anything unreadable counts as absent.
fn count_from_value(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n.as_i64().map(|v| v as f64).or_else(|| n.as_f64())?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}

fn pick_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    let raw = keys
        .iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))?;
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn pick_phase(value: &Value, keys: &[&str]) -> Option<PhaseResult> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(PhaseResult::from_value)
}

fn pick_date(value: &Value, keys: &[&str]) -> Option<NaiveDate> {
    let raw = keys
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))?;
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
