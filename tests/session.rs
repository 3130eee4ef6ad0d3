use std::rc::Rc;

use chrono::{Duration, TimeZone, Utc};

use kingshot_atlas::bounded_cache::DEFAULT_CAPACITY;
use kingshot_atlas::config::AtlasConfig;
use kingshot_atlas::fake_kingdoms::generate_kingdoms;
use kingshot_atlas::kingdom_stats::{KvkOutcome, KvkRecord, PhaseResult};
use kingshot_atlas::kingdom_store;
use kingshot_atlas::notifications::NotificationPayload;
use kingshot_atlas::rate_limit::ManualClock;
use kingshot_atlas::state::AtlasState;

fn session() -> (Rc<ManualClock>, AtlasState<Rc<ManualClock>>) {
    let clock = Rc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 8, 1, 9, 0, 0).unwrap(),
    ));
    let cfg = AtlasConfig::from_lookup(|key| match key {
        "ATLAS_NOTIFY_WINDOW_MINS" => Some("30".to_string()),
        "ATLAS_RATE_LIMIT_MAX" => Some("3".to_string()),
        _ => None,
    });
    let state = AtlasState::with_clock(&cfg, Rc::clone(&clock));
    (clock, state)
}

#[test]
fn demo_leaderboard_is_ranked() {
    let (_, mut st) = session();
    st.load_profiles(generate_kingdoms(120, 3));
    let rows = st.leaderboard();
    assert_eq!(rows.len(), 120);
    assert_eq!(rows[0].rank, 1);
    for pair in rows.windows(2) {
        assert!(pair[0].score.final_score >= pair[1].score.final_score);
        assert!(pair[0].rank <= pair[1].rank);
    }
}

#[test]
fn kvk_results_group_inside_window() {
    let (clock, mut st) = session();
    for kvk in 1..=3 {
        st.push_notification(NotificationPayload::KvkResult {
            kingdom_number: 172,
            kvk_number: kvk,
            outcome: KvkOutcome::Domination,
            opponent_kingdom: None,
        });
        clock.advance(Duration::minutes(10));
    }
    clock.advance(Duration::hours(2));
    st.push_notification(NotificationPayload::KvkResult {
        kingdom_number: 172,
        kvk_number: 4,
        outcome: KvkOutcome::Invasion,
        opponent_kingdom: Some(45),
    });

    let groups = st.grouped_notifications();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].count(), 1);
    assert_eq!(groups[1].count(), 3);
    assert_eq!(groups[1].unread, 3);

    st.mark_all_read();
    assert!(st.grouped_notifications().iter().all(|g| g.unread == 0));
}

#[test]
fn translations_are_capped() {
    let (_, mut st) = session();
    for i in 0..(DEFAULT_CAPACITY + 25) {
        st.translations
            .insert("de", &format!("line {i}"), format!("Zeile {i}"));
    }
    assert_eq!(st.translations.len(), DEFAULT_CAPACITY);
    assert!(st.translations.get("de", "line 0").is_none());
    assert_eq!(
        st.translations.get("de", &format!("line {}", DEFAULT_CAPACITY + 24)),
        Some(format!("Zeile {}", DEFAULT_CAPACITY + 24).as_str())
    );
}

#[test]
fn refresh_limit_follows_config() {
    let (clock, mut st) = session();
    for _ in 0..3 {
        assert!(st.request_refresh(172).is_allowed());
    }
    assert!(!st.request_refresh(172).is_allowed());
    assert!(st.request_refresh(45).is_allowed());
    clock.advance(Duration::seconds(60));
    assert!(st.request_refresh(172).is_allowed());
}

#[test]
fn reingest_raises_notifications_for_new_results() {
    let (_, mut st) = session();
    let stored = generate_kingdoms(20, 5);
    let mut conn = kingdom_store::open_in_memory().unwrap();
    kingdom_store::upsert_profiles(&mut conn, &stored).unwrap();
    st.load_profiles(kingdom_store::load_all_profiles(&conn).unwrap());

    let mut fresh = stored.clone();
    let target = &mut fresh[0];
    let next = target
        .recent_kvks
        .iter()
        .filter_map(|r| r.kvk_number)
        .max()
        .unwrap_or(0)
        + 1;
    target.recent_kvks.insert(
        0,
        KvkRecord {
            kvk_number: Some(next),
            opponent_kingdom: Some(999),
            prep_result: Some(PhaseResult::Win),
            battle_result: Some(PhaseResult::Win),
            kvk_date: None,
        },
    );
    let kingdom = target.kingdom_number;

    assert!(st.apply_profile_updates(fresh.clone()) >= 1);
    assert!(st.notifications.iter().any(|n| matches!(
        n.payload,
        NotificationPayload::KvkResult { kingdom_number, kvk_number, outcome: KvkOutcome::Domination, .. }
            if kingdom_number == kingdom && kvk_number == next
    )));

    // The same batch again has nothing new to report.
    assert_eq!(st.apply_profile_updates(fresh), 0);
}
