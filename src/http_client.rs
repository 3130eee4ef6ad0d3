use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::config::SupabaseConfig;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("kingshot_atlas/", env!("CARGO_PKG_VERSION"));

/// Headers every Atlas REST read carries. The anon key goes out twice, once
/// as `apikey` and once as a bearer token.
pub fn rest_headers(cfg: &SupabaseConfig) -> Result<HeaderMap> {
    let key = cfg.anon_key.trim();
    let mut api_key = HeaderValue::from_str(key).context("anon key is not a valid header value")?;
    api_key.set_sensitive(true);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
        .context("anon key is not a valid header value")?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("apikey"), api_key);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Blocking client scoped to one Atlas project; credentials are baked in as
/// default headers so callers only add conditional-GET headers.
pub fn rest_client(cfg: &SupabaseConfig, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(rest_headers(cfg)?)
        .build()
        .context("failed to build atlas rest client")
}
