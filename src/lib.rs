pub mod atlas_fetch;
pub mod atlas_score;
pub mod bounded_cache;
pub mod config;
pub mod event_calendar;
pub mod fake_kingdoms;
pub mod http_cache;
pub mod http_client;
pub mod kingdom_stats;
pub mod kingdom_store;
pub mod leaderboard;
pub mod leaderboard_export;
pub mod notifications;
pub mod persist;
pub mod prediction;
pub mod rate_limit;
pub mod state;
