use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};

use crate::bounded_cache::DEFAULT_CAPACITY;
use crate::event_calendar::{
    DEFAULT_CYCLE_DAYS, KvkCalendar, MAX_CYCLE_DAYS, MIN_CYCLE_DAYS, default_anchor,
};
use crate::kingdom_store;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct AtlasConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub db_path: Option<PathBuf>,
    pub kvk_anchor: DateTime<Utc>,
    pub kvk_cycle_days: i64,
    pub notify_window_mins: i64,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: i64,
    pub cache_capacity: usize,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AtlasConfig {
    /// Loads `.env.local` then `.env` (first one wins per key) and reads the process env.
    pub fn load() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            supabase_url: non_empty("SUPABASE_URL").map(|v| v.trim_end_matches('/').to_string()),
            supabase_anon_key: non_empty("SUPABASE_ANON_KEY"),
            db_path: non_empty("ATLAS_DB_PATH").map(PathBuf::from),
            kvk_anchor: non_empty("ATLAS_KVK_ANCHOR")
                .and_then(|raw| parse_anchor(&raw))
                .unwrap_or_else(default_anchor),
            kvk_cycle_days: non_empty("ATLAS_KVK_CYCLE_DAYS")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(DEFAULT_CYCLE_DAYS)
                .clamp(MIN_CYCLE_DAYS, MAX_CYCLE_DAYS),
            notify_window_mins: non_empty("ATLAS_NOTIFY_WINDOW_MINS")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60)
                .clamp(1, 24 * 60),
            rate_limit_max: non_empty("ATLAS_RATE_LIMIT_MAX")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(5)
                .max(1),
            rate_limit_window_secs: non_empty("ATLAS_RATE_LIMIT_WINDOW_SECS")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60)
                .max(1),
            cache_capacity: non_empty("ATLAS_CACHE_CAPACITY")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_CAPACITY)
                .clamp(1, 10_000),
        }
    }

    pub fn supabase(&self) -> Result<SupabaseConfig> {
        let url = self
            .supabase_url
            .clone()
            .ok_or_else(|| anyhow!("SUPABASE_URL is not set"))?;
        let anon_key = self
            .supabase_anon_key
            .clone()
            .ok_or_else(|| anyhow!("SUPABASE_ANON_KEY is not set"))?;
        Ok(SupabaseConfig { url, anon_key })
    }

    pub fn calendar(&self) -> KvkCalendar {
        KvkCalendar::new(self.kvk_anchor, self.kvk_cycle_days)
    }

    pub fn resolve_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(kingdom_store::default_db_path)
    }
}

fn parse_anchor(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> AtlasConfig {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        AtlasConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let cfg = AtlasConfig::default();
        assert!(cfg.supabase_url.is_none());
        assert!(cfg.supabase().is_err());
        assert_eq!(cfg.kvk_cycle_days, DEFAULT_CYCLE_DAYS);
        assert_eq!(cfg.kvk_anchor, default_anchor());
        assert_eq!(cfg.cache_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn reads_and_clamps_values() {
        let cfg = from_map(&[
            ("SUPABASE_URL", "https://example.supabase.co/"),
            ("SUPABASE_ANON_KEY", " key "),
            ("ATLAS_KVK_ANCHOR", "2025-08-02"),
            ("ATLAS_KVK_CYCLE_DAYS", "1"),
            ("ATLAS_RATE_LIMIT_MAX", "0"),
            ("ATLAS_NOTIFY_WINDOW_MINS", "oops"),
        ]);
        let sb = cfg.supabase().unwrap();
        assert_eq!(sb.url, "https://example.supabase.co");
        assert_eq!(sb.anon_key, "key");
        assert_eq!(cfg.kvk_anchor.to_rfc3339(), "2025-08-02T00:00:00+00:00");
        assert_eq!(cfg.kvk_cycle_days, 5);
        assert_eq!(cfg.rate_limit_max, 1);
        assert_eq!(cfg.notify_window_mins, 60);
    }

    #[test]
    fn rfc3339_anchor() {
        let cfg = from_map(&[("ATLAS_KVK_ANCHOR", "2025-08-02T12:00:00+02:00")]);
        assert_eq!(cfg.kvk_anchor.to_rfc3339(), "2025-08-02T10:00:00+00:00");
    }
}
