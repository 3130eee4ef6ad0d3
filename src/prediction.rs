use serde::{Deserialize, Serialize};

use crate::atlas_score::{NEUTRAL_WIN_RATE, Tier, calculate_atlas_score, round2, win_rate};
use crate::kingdom_stats::{
    KingdomProfile, KingdomStats, KvkOutcome, RECENT_OUTCOMES_MAX, extract_stats,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub outcome: KvkOutcome,
    pub probability: f64,
    pub projected_score: f64,
    pub score_change: f64,
    pub new_tier: Tier,
    pub tier_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    /// Always four entries, highest probability first.
    pub predictions: Vec<Prediction>,
    pub current_score: f64,
    pub current_tier: Tier,
    /// Phase rates after any opponent adjustment.
    pub prep_rate: f64,
    pub battle_rate: f64,
}

impl PredictionSet {
    pub fn most_likely(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    pub fn get(&self, outcome: KvkOutcome) -> Option<&Prediction> {
        self.predictions.iter().find(|p| p.outcome == outcome)
    }

    pub fn total_probability(&self) -> f64 {
        self.predictions.iter().map(|p| p.probability).sum()
    }
}

/// Probability that a side with phase rate `p` beats a side with rate `q`,
/// from the paired odds ratio. Collapses to 0.5 when the ratio is undefined.
pub fn adjusted_rate(p: f64, q: f64) -> f64 {
    let p = sanitize_rate(p);
    let q = sanitize_rate(q);
    let num = p * (1.0 - q);
    let den = num + (1.0 - p) * q;
    if den <= 0.0 || !den.is_finite() {
        return NEUTRAL_WIN_RATE;
    }
    (num / den).clamp(0.0, 1.0)
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        NEUTRAL_WIN_RATE
    }
}

/// Returns a copy of `stats` with one more KvK ending in `outcome`.
pub fn simulate_kvk(stats: &KingdomStats, outcome: KvkOutcome) -> KingdomStats {
    let mut next = stats.clone();
    next.total_kvks = next.total_kvks.saturating_add(1);

    if outcome.prep_won() {
        next.prep_wins = next.prep_wins.saturating_add(1);
        next.current_prep_streak = next.current_prep_streak.saturating_add(1);
    } else {
        next.prep_losses = next.prep_losses.saturating_add(1);
        next.current_prep_streak = 0;
    }

    if outcome.battle_won() {
        next.battle_wins = next.battle_wins.saturating_add(1);
        next.current_battle_streak = next.current_battle_streak.saturating_add(1);
    } else {
        next.battle_losses = next.battle_losses.saturating_add(1);
        next.current_battle_streak = 0;
    }

    match outcome {
        KvkOutcome::Domination => next.dominations = next.dominations.saturating_add(1),
        KvkOutcome::Invasion => next.invasions = next.invasions.saturating_add(1),
        KvkOutcome::Reversal | KvkOutcome::Comeback => {}
    }

    next.recent_outcomes.insert(0, outcome);
    next.recent_outcomes.truncate(RECENT_OUTCOMES_MAX);
    next
}

pub fn predict_outcomes(kingdom: &KingdomStats, opponent: Option<&KingdomStats>) -> PredictionSet {
    let current = calculate_atlas_score(kingdom);

    let mut prep_rate = win_rate(kingdom.prep_wins, kingdom.prep_losses);
    let mut battle_rate = win_rate(kingdom.battle_wins, kingdom.battle_losses);
    if let Some(opp) = opponent {
        prep_rate = adjusted_rate(prep_rate, win_rate(opp.prep_wins, opp.prep_losses));
        battle_rate = adjusted_rate(battle_rate, win_rate(opp.battle_wins, opp.battle_losses));
    }

    let mut predictions = KvkOutcome::ALL
        .iter()
        .map(|&outcome| {
            let p_prep = if outcome.prep_won() {
                prep_rate
            } else {
                1.0 - prep_rate
            };
            let p_battle = if outcome.battle_won() {
                battle_rate
            } else {
                1.0 - battle_rate
            };

            let projected = calculate_atlas_score(&simulate_kvk(kingdom, outcome));
            Prediction {
                outcome,
                probability: (p_prep * p_battle).clamp(0.0, 1.0),
                projected_score: projected.final_score,
                score_change: round2(projected.final_score - current.final_score),
                new_tier: projected.tier,
                tier_change: projected.tier != current.tier,
            }
        })
        .collect::<Vec<_>>();

    // Stable: equal probabilities keep enumeration order.
    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    PredictionSet {
        predictions,
        current_score: current.final_score,
        current_tier: current.tier,
        prep_rate,
        battle_rate,
    }
}

pub fn predict_profile_outcomes(
    kingdom: &KingdomProfile,
    opponent: Option<&KingdomProfile>,
) -> PredictionSet {
    let stats = extract_stats(kingdom);
    let opponent_stats = opponent.map(extract_stats);
    predict_outcomes(&stats, opponent_stats.as_ref())
}
