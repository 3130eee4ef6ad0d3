use std::fs;
use std::path::PathBuf;

use kingshot_atlas::atlas_fetch::{attach_history, parse_kvk_history_json};
use kingshot_atlas::atlas_score::{Tier, calculate_atlas_score};
use kingshot_atlas::kingdom_stats::{KvkOutcome, extract_stats, parse_kingdom_profiles_json};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_kingdom_rows_and_skips_junk() {
    let raw = read_fixture("kingdoms.json");
    let rows = parse_kingdom_profiles_json(&raw).expect("fixture should parse");
    let numbers = rows.iter().map(|r| r.kingdom_number).collect::<Vec<_>>();
    assert_eq!(numbers, vec![172, 45, 9]);

    assert_eq!(rows[0].atlas_score, Some(8.1));
    assert_eq!(rows[1].total_kvks, Some(3));
    assert_eq!(rows[1].invasions, Some(2));
    assert_eq!(rows[1].atlas_score, None);
    assert_eq!(rows[2].prep_wins, None);
    assert_eq!(rows[2].recent_kvks.len(), 3);
}

#[test]
fn scores_fixture_kingdoms() {
    let rows = parse_kingdom_profiles_json(&read_fixture("kingdoms.json")).unwrap();

    let full = calculate_atlas_score(&extract_stats(&rows[0]));
    assert!((full.final_score - 6.68).abs() < 1e-9);
    assert_eq!(full.tier, Tier::A);

    let weak = calculate_atlas_score(&extract_stats(&rows[1]));
    assert!((weak.final_score - 0.49).abs() < 1e-9);
    assert_eq!(weak.tier, Tier::C);

    // Counters missing entirely: everything comes from the two complete records.
    let derived = extract_stats(&rows[2]);
    assert_eq!(derived.total_kvks, 2);
    assert_eq!((derived.prep_wins, derived.prep_losses), (1, 1));
    assert_eq!((derived.battle_wins, derived.battle_losses), (1, 1));
    assert_eq!(derived.current_prep_streak, 1);
    assert_eq!(derived.current_battle_streak, 0);
    assert_eq!(
        derived.recent_outcomes,
        vec![KvkOutcome::Reversal, KvkOutcome::Comeback]
    );
    let score = calculate_atlas_score(&derived);
    assert!((score.final_score - 3.75).abs() < 1e-9);
}

#[test]
fn history_rows_attach_to_profiles() {
    let history = parse_kvk_history_json(&read_fixture("kvk_history.json")).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].0, 45);
    assert_eq!(
        history[0].1.kvk_date.map(|d| d.to_string()).as_deref(),
        Some("2025-10-11")
    );

    let mut rows = parse_kingdom_profiles_json(&read_fixture("kingdoms.json")).unwrap();
    attach_history(&mut rows, history);
    assert_eq!(rows[0].recent_kvks.len(), 2);
    assert_eq!(rows[1].recent_kvks.len(), 1);
    // Kingdom 9 had no history rows, so its embedded records stay.
    assert_eq!(rows[2].recent_kvks.len(), 3);

    let top = extract_stats(&rows[0]);
    assert_eq!(
        top.recent_outcomes,
        vec![KvkOutcome::Domination, KvkOutcome::Reversal]
    );
    let score = calculate_atlas_score(&top);
    assert!((score.final_score - 6.71).abs() < 1e-9);

    let score = calculate_atlas_score(&extract_stats(&rows[1]));
    assert!((score.final_score - 0.52).abs() < 1e-9);
}

#[test]
fn invalid_json_is_an_error() {
    assert!(parse_kingdom_profiles_json("{not json").is_err());
    assert!(parse_kvk_history_json("[1,").is_err());
    assert!(parse_kvk_history_json("{}").unwrap().is_empty());
}
