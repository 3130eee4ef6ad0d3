use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CYCLE_DAYS: i64 = 28;
const PREP_HOURS: i64 = 72;
const BATTLE_HOURS: i64 = 24;
pub const MIN_CYCLE_DAYS: i64 = 5;
pub const MAX_CYCLE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KvkPhase {
    Prep,
    Battle,
    OffSeason,
}

impl KvkPhase {
    pub fn label(self) -> &'static str {
        match self {
            KvkPhase::Prep => "Prep Phase",
            KvkPhase::Battle => "Battle Phase",
            KvkPhase::OffSeason => "Off-season",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn from_duration(d: Duration) -> Self {
        let total = d.num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    pub fn label(&self) -> String {
        if self.days > 0 {
            format!("{}d {:02}h {:02}m", self.days, self.hours, self.minutes)
        } else {
            format!("{:02}h {:02}m {:02}s", self.hours, self.minutes, self.seconds)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub cycle: i64,
    pub phase: KvkPhase,
    pub next_phase: KvkPhase,
    pub next_change_at: DateTime<Utc>,
    pub countdown: Countdown,
}

/// KvK schedule: every cycle opens with the prep phase at a fixed offset from
/// the anchor, then the battle phase, then off-season until the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvkCalendar {
    anchor: DateTime<Utc>,
    cycle: Duration,
}

impl Default for KvkCalendar {
    fn default() -> Self {
        Self::new(default_anchor(), DEFAULT_CYCLE_DAYS)
    }
}

pub fn default_anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 24, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl KvkCalendar {
    pub fn new(anchor: DateTime<Utc>, cycle_days: i64) -> Self {
        Self {
            anchor,
            cycle: Duration::days(cycle_days.clamp(MIN_CYCLE_DAYS, MAX_CYCLE_DAYS)),
        }
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn cycle_length(&self) -> Duration {
        self.cycle
    }

    /// 1 for the cycle opening at the anchor; cycles before it count down to 0 and below.
    pub fn cycle_number(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed_secs(now).div_euclid(self.cycle.num_seconds()) + 1
    }

    pub fn cycle_start(&self, cycle: i64) -> DateTime<Utc> {
        self.anchor + Duration::seconds((cycle - 1) * self.cycle.num_seconds())
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> KvkPhase {
        let offset = self.offset_secs(now);
        if offset < PREP_HOURS * 3_600 {
            KvkPhase::Prep
        } else if offset < (PREP_HOURS + BATTLE_HOURS) * 3_600 {
            KvkPhase::Battle
        } else {
            KvkPhase::OffSeason
        }
    }

    /// Start of the first cycle strictly after `now`.
    pub fn next_kvk_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.cycle_start(self.cycle_number(now) + 1)
    }

    pub fn next_phase_change(&self, now: DateTime<Utc>) -> (KvkPhase, DateTime<Utc>) {
        let start = self.cycle_start(self.cycle_number(now));
        match self.phase_at(now) {
            KvkPhase::Prep => (KvkPhase::Battle, start + Duration::hours(PREP_HOURS)),
            KvkPhase::Battle => (
                KvkPhase::OffSeason,
                start + Duration::hours(PREP_HOURS + BATTLE_HOURS),
            ),
            KvkPhase::OffSeason => (KvkPhase::Prep, self.next_kvk_start(now)),
        }
    }

    pub fn time_until_next_phase(&self, now: DateTime<Utc>) -> Duration {
        let (_, at) = self.next_phase_change(now);
        at.signed_duration_since(now)
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::from_duration(self.time_until_next_phase(now))
    }

    pub fn status(&self, now: DateTime<Utc>) -> PhaseStatus {
        let (next_phase, next_change_at) = self.next_phase_change(now);
        PhaseStatus {
            cycle: self.cycle_number(now),
            phase: self.phase_at(now),
            next_phase,
            next_change_at,
            countdown: Countdown::from_duration(next_change_at.signed_duration_since(now)),
        }
    }

    fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.anchor).num_seconds()
    }

    fn offset_secs(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed_secs(now).rem_euclid(self.cycle.num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> KvkCalendar {
        KvkCalendar::default()
    }

    fn day(d: i64, h: i64) -> DateTime<Utc> {
        default_anchor() + Duration::days(d) + Duration::hours(h)
    }

    #[test]
    fn phases_follow_offsets() {
        assert_eq!(cal().phase_at(day(0, 0)), KvkPhase::Prep);
        assert_eq!(cal().phase_at(day(2, 23)), KvkPhase::Prep);
        assert_eq!(cal().phase_at(day(3, 0)), KvkPhase::Battle);
        assert_eq!(cal().phase_at(day(3, 23)), KvkPhase::Battle);
        assert_eq!(cal().phase_at(day(4, 0)), KvkPhase::OffSeason);
        assert_eq!(cal().phase_at(day(28, 1)), KvkPhase::Prep);
    }

    #[test]
    fn cycle_numbers_handle_dates_before_anchor() {
        assert_eq!(cal().cycle_number(day(0, 0)), 1);
        assert_eq!(cal().cycle_number(day(27, 23)), 1);
        assert_eq!(cal().cycle_number(day(28, 0)), 2);
        assert_eq!(cal().cycle_number(day(-1, 0)), 0);
        assert_eq!(cal().phase_at(day(-1, 0)), KvkPhase::OffSeason);
    }

    #[test]
    fn next_change_and_countdown() {
        let now = day(1, 6);
        let status = cal().status(now);
        assert_eq!(status.phase, KvkPhase::Prep);
        assert_eq!(status.next_phase, KvkPhase::Battle);
        assert_eq!(status.next_change_at, day(3, 0));
        assert_eq!(
            status.countdown,
            Countdown {
                days: 1,
                hours: 18,
                minutes: 0,
                seconds: 0
            }
        );
        assert_eq!(status.countdown.label(), "1d 18h 00m");

        let off = day(10, 0);
        assert_eq!(cal().next_phase_change(off), (KvkPhase::Prep, day(28, 0)));
        assert_eq!(cal().next_kvk_start(day(0, 0)), day(28, 0));
    }

    #[test]
    fn cycle_length_is_clamped_both_ways() {
        let c = KvkCalendar::new(default_anchor(), 2);
        assert_eq!(c.cycle_length(), Duration::days(MIN_CYCLE_DAYS));

        let c = KvkCalendar::new(default_anchor(), i64::MAX);
        assert_eq!(c.cycle_length(), Duration::days(MAX_CYCLE_DAYS));
        assert_eq!(c.cycle_number(day(400, 0)), 2);
    }
}
