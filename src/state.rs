use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};
use chrono::Duration;

use crate::atlas_score::{ScoreBreakdown, calculate_atlas_score};
use crate::bounded_cache::{Dismissal, DismissalStore, TranslationCache};
use crate::config::AtlasConfig;
use crate::event_calendar::{KvkCalendar, KvkPhase, PhaseStatus};
use crate::kingdom_stats::{KingdomProfile, KvkRecord, extract_stats};
use crate::leaderboard::{LeaderboardEntry, build_leaderboard};
use crate::notifications::{Notification, NotificationGroup, NotificationPayload, group_notifications};
use crate::prediction::{PredictionSet, predict_outcomes};
use crate::rate_limit::{Clock, FixedWindowLimiter, RateDecision, SystemClock};

const MAX_LOGS: usize = 200;
const MAX_NOTIFICATIONS: usize = 500;
const LOCAL_ID_PREFIX: &str = "local-";

/// Everything one Atlas session keeps in memory. Caches and the limiter are
/// owned here and handed out by reference.
#[derive(Debug)]
pub struct AtlasState<C: Clock = SystemClock> {
    pub profiles: HashMap<u32, KingdomProfile>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub leaderboard_dirty: bool,
    pub notifications: Vec<Notification>,
    pub notify_window: Duration,
    pub translations: TranslationCache,
    pub dismissals: DismissalStore,
    pub calendar: KvkCalendar,
    pub logs: VecDeque<String>,
    limiter: FixedWindowLimiter<C>,
    next_notification_id: u64,
}

impl AtlasState<SystemClock> {
    pub fn new(cfg: &AtlasConfig) -> Self {
        Self::with_clock(cfg, SystemClock)
    }
}

impl<C: Clock> AtlasState<C> {
    pub fn with_clock(cfg: &AtlasConfig, clock: C) -> Self {
        Self {
            profiles: HashMap::new(),
            leaderboard: Vec::new(),
            leaderboard_dirty: false,
            notifications: Vec::new(),
            notify_window: Duration::minutes(cfg.notify_window_mins),
            translations: TranslationCache::new(cfg.cache_capacity),
            dismissals: DismissalStore::new(cfg.cache_capacity),
            calendar: cfg.calendar(),
            logs: VecDeque::new(),
            limiter: FixedWindowLimiter::new(
                clock,
                cfg.rate_limit_max,
                Duration::seconds(cfg.rate_limit_window_secs),
            ),
            next_notification_id: 1,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn load_profiles(&mut self, profiles: Vec<KingdomProfile>) {
        let count = profiles.len();
        self.profiles = profiles
            .into_iter()
            .map(|p| (p.kingdom_number, p))
            .collect();
        self.leaderboard_dirty = true;
        self.push_log(format!("[INFO] Loaded {count} kingdoms"));
    }

    pub fn leaderboard(&mut self) -> &[LeaderboardEntry] {
        if self.leaderboard_dirty || self.leaderboard.len() != self.profiles.len() {
            let profiles = self.profiles.values().cloned().collect::<Vec<_>>();
            self.leaderboard = build_leaderboard(&profiles);
            self.leaderboard_dirty = false;
        }
        &self.leaderboard
    }

    pub fn score(&self, kingdom: u32) -> Option<ScoreBreakdown> {
        self.profiles
            .get(&kingdom)
            .map(|p| calculate_atlas_score(&extract_stats(p)))
    }

    pub fn predict(&self, kingdom: u32, opponent: Option<u32>) -> Result<PredictionSet> {
        let subject = self
            .profiles
            .get(&kingdom)
            .ok_or_else(|| anyhow!("kingdom {kingdom} is not tracked"))?;
        let opponent_stats = match opponent {
            Some(n) => Some(extract_stats(
                self.profiles
                    .get(&n)
                    .ok_or_else(|| anyhow!("opponent kingdom {n} is not tracked"))?,
            )),
            None => None,
        };
        Ok(predict_outcomes(&extract_stats(subject), opponent_stats.as_ref()))
    }

    /// Throttles manual "refresh this kingdom" requests per kingdom.
    pub fn request_refresh(&mut self, kingdom: u32) -> RateDecision {
        let decision = self.limiter.check(&format!("refresh:{kingdom}"));
        if let RateDecision::Limited { retry_after } = decision {
            self.push_log(format!(
                "[WARN] Refresh for kingdom {kingdom} limited, retry in {}s",
                retry_after.num_seconds()
            ));
        }
        decision
    }

    /// Replaces a profile and raises a score-change notification when the
    /// recomputed score moved.
    pub fn apply_profile_update(&mut self, profile: KingdomProfile) -> Option<&Notification> {
        let kingdom = profile.kingdom_number;
        let old = self.score(kingdom);
        let new = calculate_atlas_score(&extract_stats(&profile));
        self.profiles.insert(kingdom, profile);
        self.leaderboard_dirty = true;

        let old = old?;
        if (old.final_score - new.final_score).abs() < f64::EPSILON {
            return None;
        }
        self.push_log(format!(
            "[INFO] Kingdom {kingdom} score {:.2} -> {:.2}",
            old.final_score, new.final_score
        ));
        self.push_notification(NotificationPayload::ScoreChange {
            kingdom_number: kingdom,
            old_score: old.final_score,
            new_score: new.final_score,
            old_tier: old.tier,
            new_tier: new.tier,
        });
        self.notifications.last()
    }

    /// Applies a fresh batch of profiles on top of the tracked ones. Kingdoms
    /// seen before raise a `KvkResult` per newly recorded KvK and a
    /// `ScoreChange` when their score moved. Returns how many were raised.
    pub fn apply_profile_updates(&mut self, profiles: Vec<KingdomProfile>) -> usize {
        let mut raised = 0;
        for profile in profiles {
            let kingdom = profile.kingdom_number;
            if let Some(previous) = self.profiles.get(&kingdom) {
                let seen = latest_kvk(&previous.recent_kvks);
                let mut fresh = profile
                    .recent_kvks
                    .iter()
                    .filter_map(|r| Some((r.kvk_number?, r)))
                    .filter(|(n, _)| *n > seen)
                    .filter_map(|(n, r)| Some((n, r.outcome()?, r.opponent_kingdom)))
                    .collect::<Vec<_>>();
                fresh.sort_by_key(|(n, _, _)| *n);
                for (kvk_number, outcome, opponent_kingdom) in fresh {
                    self.push_notification(NotificationPayload::KvkResult {
                        kingdom_number: kingdom,
                        kvk_number,
                        outcome,
                        opponent_kingdom,
                    });
                    raised += 1;
                }
            }
            if self.apply_profile_update(profile).is_some() {
                raised += 1;
            }
        }
        raised
    }

    pub fn push_notification(&mut self, payload: NotificationPayload) {
        let id = format!("{LOCAL_ID_PREFIX}{}", self.next_notification_id);
        self.next_notification_id += 1;
        self.notifications.push(Notification {
            id,
            created_at: self.limiter_clock_now(),
            read: false,
            payload,
        });
        self.cap_notifications();
    }

    /// Merges a saved session. Locally issued ids continue after the highest
    /// one restored so new notifications never collide with old dismissals.
    pub fn restore_session(&mut self, dismissals: Vec<Dismissal>, notifications: Vec<Notification>) {
        let highest = dismissals
            .iter()
            .map(|d| d.id.as_str())
            .chain(notifications.iter().map(|n| n.id.as_str()))
            .filter_map(local_sequence)
            .max()
            .unwrap_or(0);
        self.next_notification_id = self.next_notification_id.max(highest.saturating_add(1));

        self.dismissals.extend(dismissals);
        for n in notifications {
            if !self.notifications.iter().any(|existing| existing.id == n.id) {
                self.notifications.push(n);
            }
        }
        self.notifications.sort_by_key(|n| n.created_at);
        self.cap_notifications();
    }

    fn cap_notifications(&mut self) {
        if self.notifications.len() > MAX_NOTIFICATIONS {
            let overflow = self.notifications.len() - MAX_NOTIFICATIONS;
            self.notifications.drain(..overflow);
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in &mut self.notifications {
            n.read = true;
        }
    }

    pub fn dismiss_notification(&mut self, id: &str) {
        let now = self.limiter_clock_now();
        self.dismissals.dismiss(id, now);
    }

    /// Dismisses every member of the visible group holding `id`, or just `id`
    /// when it is not part of any group. Returns the number of ids dismissed.
    pub fn dismiss_group(&mut self, id: &str) -> usize {
        let ids = self
            .grouped_notifications()
            .into_iter()
            .find(|g| g.ids.iter().any(|member| member == id))
            .map(|g| g.ids)
            .unwrap_or_else(|| vec![id.to_string()]);
        for member in &ids {
            self.dismiss_notification(member);
        }
        ids.len()
    }

    pub fn grouped_notifications(&self) -> Vec<NotificationGroup> {
        let visible = self
            .notifications
            .iter()
            .filter(|n| !self.dismissals.is_dismissed(&n.id))
            .cloned()
            .collect::<Vec<_>>();
        group_notifications(&visible, self.notify_window)
    }

    pub fn phase_status(&self) -> PhaseStatus {
        self.calendar.status(self.limiter_clock_now())
    }

    /// Countdown text for the KvK banner, hidden once dismissed for the current cycle.
    pub fn countdown_banner(&self) -> Option<String> {
        let status = self.phase_status();
        if self.dismissals.is_dismissed(&banner_id(status.cycle)) {
            return None;
        }
        let text = match status.phase {
            KvkPhase::OffSeason => format!(
                "KvK #{} starts in {}",
                status.cycle + 1,
                status.countdown.label()
            ),
            phase => format!(
                "KvK #{} {} ends in {}",
                status.cycle,
                phase.label(),
                status.countdown.label()
            ),
        };
        Some(text)
    }

    pub fn dismiss_countdown_banner(&mut self) {
        let id = banner_id(self.phase_status().cycle);
        self.dismiss_notification(&id);
    }

    fn limiter_clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.limiter.clock().now()
    }
}

fn banner_id(cycle: i64) -> String {
    format!("kvk-countdown-{cycle}")
}

fn local_sequence(id: &str) -> Option<u64> {
    id.strip_prefix(LOCAL_ID_PREFIX)?.parse().ok()
}

fn latest_kvk(records: &[KvkRecord]) -> u32 {
    records.iter().filter_map(|r| r.kvk_number).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_calendar::default_anchor;
    use crate::rate_limit::ManualClock;
    use std::rc::Rc;

    fn state() -> (Rc<ManualClock>, AtlasState<Rc<ManualClock>>) {
        let clock = Rc::new(ManualClock::new(default_anchor() + Duration::days(1)));
        let cfg = AtlasConfig {
            rate_limit_max: 2,
            ..AtlasConfig::default()
        };
        let st = AtlasState::with_clock(&cfg, Rc::clone(&clock));
        (clock, st)
    }

    fn profile(n: u32, wins: u32, losses: u32) -> KingdomProfile {
        KingdomProfile {
            kingdom_number: n,
            prep_wins: Some(wins),
            prep_losses: Some(losses),
            battle_wins: Some(wins),
            battle_losses: Some(losses),
            ..Default::default()
        }
    }

    #[test]
    fn leaderboard_rebuilds_when_dirty() {
        let (_, mut st) = state();
        st.load_profiles(vec![profile(1, 2, 8), profile(2, 8, 2)]);
        assert_eq!(st.leaderboard()[0].kingdom_number, 2);
        st.apply_profile_update(profile(1, 10, 0));
        assert_eq!(st.leaderboard()[0].kingdom_number, 1);
        assert!(st.logs.iter().any(|l| l.contains("Loaded 2 kingdoms")));
    }

    #[test]
    fn predict_requires_tracked_kingdoms() {
        let (_, mut st) = state();
        st.load_profiles(vec![profile(1, 7, 3), profile(2, 5, 5)]);
        let set = st.predict(1, Some(2)).unwrap();
        assert_eq!(set.predictions.len(), 4);
        assert!(st.predict(9, None).is_err());
        assert!(st.predict(1, Some(9)).is_err());
    }

    #[test]
    fn score_change_raises_notification() {
        let (_, mut st) = state();
        st.load_profiles(vec![profile(1, 5, 5)]);
        let n = st.apply_profile_update(profile(1, 9, 1)).cloned().unwrap();
        assert!(matches!(n.payload, NotificationPayload::ScoreChange { kingdom_number: 1, .. }));
        assert!(st.apply_profile_update(profile(1, 9, 1)).is_none());

        let groups = st.grouped_notifications();
        assert_eq!(groups.len(), 1);
        st.dismiss_notification(&n.id);
        assert!(st.grouped_notifications().is_empty());
    }

    fn with_history(mut p: KingdomProfile, results: &[(u32, bool, bool)]) -> KingdomProfile {
        use crate::kingdom_stats::PhaseResult;
        let phase = |won: bool| Some(if won { PhaseResult::Win } else { PhaseResult::Loss });
        p.recent_kvks = results
            .iter()
            .map(|&(n, prep, battle)| KvkRecord {
                kvk_number: Some(n),
                prep_result: phase(prep),
                battle_result: phase(battle),
                ..Default::default()
            })
            .collect();
        p
    }

    #[test]
    fn batch_update_raises_kvk_results_and_score_changes() {
        let (_, mut st) = state();
        st.load_profiles(vec![
            with_history(profile(1, 1, 1), &[(1, true, true), (2, false, false)]),
            profile(2, 3, 3),
        ]);

        // New kingdoms and unchanged kingdoms stay quiet.
        assert_eq!(st.apply_profile_updates(vec![profile(2, 3, 3), profile(3, 1, 0)]), 0);

        let updated = with_history(
            profile(1, 3, 1),
            &[(4, true, false), (3, true, true), (2, false, false), (1, true, true)],
        );
        assert_eq!(st.apply_profile_updates(vec![updated]), 3);
        let kinds = st
            .notifications
            .iter()
            .map(|n| match &n.payload {
                NotificationPayload::KvkResult { kvk_number, .. } => format!("kvk{kvk_number}"),
                NotificationPayload::ScoreChange { .. } => "score".to_string(),
                _ => "other".to_string(),
            })
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["kvk3", "kvk4", "score"]);
    }

    #[test]
    fn restored_ids_are_never_reissued() {
        let (_, mut st) = state();
        let old = Notification {
            id: "local-7".to_string(),
            created_at: default_anchor(),
            read: true,
            payload: NotificationPayload::System {
                title: "t".into(),
                body: "b".into(),
                link: None,
            },
        };
        let dismissed = Dismissal {
            id: "local-9".to_string(),
            dismissed_at: default_anchor(),
        };
        st.restore_session(vec![dismissed], vec![old]);
        st.push_notification(NotificationPayload::System {
            title: "fresh".into(),
            body: "b".into(),
            link: None,
        });
        assert_eq!(st.notifications.last().unwrap().id, "local-10");
        assert_eq!(st.grouped_notifications().len(), 2);
    }

    #[test]
    fn restore_respects_notification_cap() {
        let (_, mut st) = state();
        let items = (0..MAX_NOTIFICATIONS + 20)
            .map(|i| Notification {
                id: format!("remote-{i}"),
                created_at: default_anchor() + Duration::minutes(i as i64),
                read: false,
                payload: NotificationPayload::System {
                    title: format!("n{i}"),
                    body: "b".into(),
                    link: None,
                },
            })
            .collect::<Vec<_>>();
        st.restore_session(Vec::new(), items);
        assert_eq!(st.notifications.len(), MAX_NOTIFICATIONS);
        assert_eq!(st.notifications[0].id, "remote-20");
    }

    #[test]
    fn dismissing_one_member_hides_its_group() {
        let (_, mut st) = state();
        for kvk in 1..=2 {
            st.push_notification(NotificationPayload::KvkResult {
                kingdom_number: 5,
                kvk_number: kvk,
                outcome: crate::kingdom_stats::KvkOutcome::Comeback,
                opponent_kingdom: None,
            });
        }
        assert_eq!(st.dismiss_group("local-1"), 2);
        assert!(st.grouped_notifications().is_empty());
        assert_eq!(st.dismiss_group("kvk-countdown-1"), 1);
        assert!(st.countdown_banner().is_none());
    }

    #[test]
    fn refresh_is_rate_limited_with_injected_clock() {
        let (clock, mut st) = state();
        assert!(st.request_refresh(1).is_allowed());
        assert!(st.request_refresh(1).is_allowed());
        assert!(!st.request_refresh(1).is_allowed());
        assert!(st.logs.back().unwrap().starts_with("[WARN]"));
        clock.advance(Duration::seconds(61));
        assert!(st.request_refresh(1).is_allowed());
    }

    #[test]
    fn countdown_banner_hides_per_cycle() {
        let (clock, mut st) = state();
        let text = st.countdown_banner().unwrap();
        assert!(text.starts_with("KvK #1 Prep Phase ends in"));
        st.dismiss_countdown_banner();
        assert!(st.countdown_banner().is_none());

        clock.advance(Duration::days(28));
        assert!(st.countdown_banner().unwrap().starts_with("KvK #2"));
    }
}
