use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kingdom_stats::{KingdomStats, KvkOutcome};

pub const PREP_WEIGHT: f64 = 0.4;
pub const BATTLE_WEIGHT: f64 = 0.6;
/// Win rate used for a phase with no decided KvKs.
pub const NEUTRAL_WIN_RATE: f64 = 0.5;
pub const SCORE_MAX: f64 = 10.0;

const BASE_SCALE: f64 = 7.0;
const DOMINATION_WEIGHT: f64 = 1.0;
const INVASION_WEIGHT: f64 = 1.0;
const PREP_STREAK_STEP: f64 = 0.10;
const BATTLE_STREAK_STEP: f64 = 0.15;
const STREAK_CAP: u32 = 5;
const EXPERIENCE_STEP: f64 = 0.075;
const EXPERIENCE_CAP: u32 = 10;

const TIER_S_MIN: f64 = 8.0;
const TIER_A_MIN: f64 = 6.5;
const TIER_B_MIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    S,
    A,
    B,
    C,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::S, Tier::A, Tier::B, Tier::C];

    /// Anything below the B cut point, including non-finite input, is C.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            Tier::C
        } else if score >= TIER_S_MIN {
            Tier::S
        } else if score >= TIER_A_MIN {
            Tier::A
        } else if score >= TIER_B_MIN {
            Tier::B
        } else {
            Tier::C
        }
    }

    pub fn min_score(self) -> f64 {
        match self {
            Tier::S => TIER_S_MIN,
            Tier::A => TIER_A_MIN,
            Tier::B => TIER_B_MIN,
            Tier::C => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "S" => Some(Tier::S),
            "A" => Some(Tier::A),
            "B" => Some(Tier::B),
            "C" => Some(Tier::C),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub prep_win_rate: f64,
    pub battle_win_rate: f64,
    pub weighted_win_rate: f64,
    pub base_score: f64,
    pub domination_bonus: f64,
    pub invasion_penalty: f64,
    pub streak_bonus: f64,
    pub experience_bonus: f64,
    pub form_bonus: f64,
    pub final_score: f64,
    pub tier: Tier,
}

pub fn win_rate(wins: u32, losses: u32) -> f64 {
    let decided = u64::from(wins) + u64::from(losses);
    if decided == 0 {
        return NEUTRAL_WIN_RATE;
    }
    wins as f64 / decided as f64
}

pub fn calculate_atlas_score(stats: &KingdomStats) -> ScoreBreakdown {
    let prep_win_rate = win_rate(stats.prep_wins, stats.prep_losses);
    let battle_win_rate = win_rate(stats.battle_wins, stats.battle_losses);
    let weighted_win_rate = PREP_WEIGHT * prep_win_rate + BATTLE_WEIGHT * battle_win_rate;
    let base_score = BASE_SCALE * weighted_win_rate;

    let (domination_bonus, invasion_penalty) = if stats.total_kvks == 0 {
        (0.0, 0.0)
    } else {
        let total = stats.total_kvks as f64;
        (
            DOMINATION_WEIGHT * stats.dominations as f64 / total,
            INVASION_WEIGHT * stats.invasions as f64 / total,
        )
    };

    let streak_bonus = PREP_STREAK_STEP * stats.current_prep_streak.min(STREAK_CAP) as f64
        + BATTLE_STREAK_STEP * stats.current_battle_streak.min(STREAK_CAP) as f64;
    let experience_bonus = EXPERIENCE_STEP * stats.total_kvks.min(EXPERIENCE_CAP) as f64;
    let form_bonus = form_bonus(&stats.recent_outcomes);

    let raw = base_score + domination_bonus - invasion_penalty
        + streak_bonus
        + experience_bonus
        + form_bonus;
    let final_score = if raw.is_finite() {
        round2(raw.clamp(0.0, SCORE_MAX))
    } else {
        0.0
    };

    ScoreBreakdown {
        prep_win_rate,
        battle_win_rate,
        weighted_win_rate,
        base_score,
        domination_bonus,
        invasion_penalty,
        streak_bonus,
        experience_bonus,
        form_bonus,
        final_score,
        tier: Tier::from_score(final_score),
    }
}

fn form_bonus(recent: &[KvkOutcome]) -> f64 {
    recent
        .iter()
        .map(|o| match o {
            KvkOutcome::Domination => 0.06,
            KvkOutcome::Comeback => 0.03,
            KvkOutcome::Reversal => -0.03,
            KvkOutcome::Invasion => -0.06,
        })
        .sum()
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(prep: (u32, u32), battle: (u32, u32)) -> KingdomStats {
        KingdomStats {
            total_kvks: (prep.0 + prep.1).max(battle.0 + battle.1),
            prep_wins: prep.0,
            prep_losses: prep.1,
            battle_wins: battle.0,
            battle_losses: battle.1,
            ..Default::default()
        }
    }

    #[test]
    fn tier_thresholds() {
        assert_eq!(Tier::from_score(10.0), Tier::S);
        assert_eq!(Tier::from_score(8.0), Tier::S);
        assert_eq!(Tier::from_score(7.99), Tier::A);
        assert_eq!(Tier::from_score(6.5), Tier::A);
        assert_eq!(Tier::from_score(5.0), Tier::B);
        assert_eq!(Tier::from_score(4.99), Tier::C);
        assert_eq!(Tier::from_score(-3.0), Tier::C);
        assert_eq!(Tier::from_score(f64::NAN), Tier::C);
    }

    #[test]
    fn empty_history_is_neutral_and_finite() {
        let b = calculate_atlas_score(&KingdomStats::default());
        assert_eq!(b.prep_win_rate, NEUTRAL_WIN_RATE);
        assert_eq!(b.battle_win_rate, NEUTRAL_WIN_RATE);
        assert!(b.final_score.is_finite());
        assert!((0.0..=SCORE_MAX).contains(&b.final_score));
        assert_eq!(b.final_score, 3.5);
        assert_eq!(b.tier, Tier::C);
    }

    #[test]
    fn same_input_same_output() {
        let s = KingdomStats {
            current_prep_streak: 2,
            current_battle_streak: 1,
            dominations: 4,
            invasions: 1,
            recent_outcomes: vec![KvkOutcome::Domination, KvkOutcome::Comeback],
            ..stats((7, 3), (6, 4))
        };
        let a = calculate_atlas_score(&s);
        let b = calculate_atlas_score(&s);
        assert_eq!(a.final_score.to_bits(), b.final_score.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn weighted_rate_sits_between_phase_rates() {
        let b = calculate_atlas_score(&stats((7, 3), (6, 4)));
        assert!((b.prep_win_rate - 0.7).abs() < 1e-12);
        assert!((b.battle_win_rate - 0.6).abs() < 1e-12);
        assert!(b.weighted_win_rate > 0.6 && b.weighted_win_rate < 0.7);
        assert!((b.weighted_win_rate - 0.64).abs() < 1e-12);
    }

    #[test]
    fn better_battle_record_never_scores_lower() {
        let low = calculate_atlas_score(&stats((5, 5), (4, 6)));
        let high = calculate_atlas_score(&stats((5, 5), (8, 2)));
        assert!(high.final_score >= low.final_score);
        assert!(high.battle_win_rate > low.battle_win_rate);
    }

    #[test]
    fn perfect_record_caps_at_max() {
        let s = KingdomStats {
            dominations: 12,
            current_prep_streak: 12,
            current_battle_streak: 12,
            recent_outcomes: vec![KvkOutcome::Domination; 5],
            ..stats((12, 0), (12, 0))
        };
        let b = calculate_atlas_score(&s);
        assert_eq!(b.final_score, SCORE_MAX);
        assert_eq!(b.tier, Tier::S);
    }

    #[test]
    fn winless_kingdom_floors_at_zero() {
        let s = KingdomStats {
            invasions: 3,
            recent_outcomes: vec![KvkOutcome::Invasion; 3],
            ..stats((0, 3), (0, 3))
        };
        let b = calculate_atlas_score(&s);
        assert!(b.final_score >= 0.0);
        assert_eq!(b.tier, Tier::C);
    }
}
