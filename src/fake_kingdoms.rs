use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::kingdom_stats::{KingdomProfile, KvkRecord, PhaseResult};

const FIRST_KVK_DATE: (i32, u32, u32) = (2025, 5, 24);

/// Deterministic synthetic kingdoms for offline runs and benches. Each kingdom
/// gets a hidden strength that biases both phases, and its counters are
/// derived from the generated history so the rows stay self-consistent.
pub fn generate_kingdoms(count: usize, seed: u64) -> Vec<KingdomProfile> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|idx| {
            let number = 1 + idx as u32;
            let kvks = rng.gen_range(0..=12u32);
            let strength: f64 = rng.gen_range(0.15..0.85);
            generate_kingdom(&mut rng, number, kvks, strength)
        })
        .collect()
}

fn generate_kingdom(rng: &mut StdRng, number: u32, kvks: u32, strength: f64) -> KingdomProfile {
    let first = NaiveDate::from_ymd_opt(FIRST_KVK_DATE.0, FIRST_KVK_DATE.1, FIRST_KVK_DATE.2);
    let mut history = Vec::with_capacity(kvks as usize);
    for kvk in (1..=kvks).rev() {
        let prep_won = rng.gen_bool(strength);
        // Battle leans on prep: a kingdom that wins prep carries momentum.
        let battle_p = if prep_won {
            (strength + 0.1).min(0.95)
        } else {
            (strength - 0.1).max(0.05)
        };
        let battle_won = rng.gen_bool(battle_p);
        history.push(KvkRecord {
            kvk_number: Some(kvk),
            opponent_kingdom: Some(rng.gen_range(1..=400)),
            prep_result: Some(phase(prep_won)),
            battle_result: Some(phase(battle_won)),
            kvk_date: first.map(|d| d + Duration::days(28 * i64::from(kvk - 1))),
        });
    }

    let prep_wins = history
        .iter()
        .filter(|r| r.prep_result == Some(PhaseResult::Win))
        .count() as u32;
    let battle_wins = history
        .iter()
        .filter(|r| r.battle_result == Some(PhaseResult::Win))
        .count() as u32;

    KingdomProfile {
        kingdom_number: number,
        total_kvks: Some(kvks),
        prep_wins: Some(prep_wins),
        prep_losses: Some(kvks - prep_wins),
        battle_wins: Some(battle_wins),
        battle_losses: Some(kvks - battle_wins),
        recent_kvks: history,
        ..Default::default()
    }
}

fn phase(won: bool) -> PhaseResult {
    if won { PhaseResult::Win } else { PhaseResult::Loss }
}
