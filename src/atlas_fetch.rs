use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::SupabaseConfig;
use crate::http_cache::HttpCache;
use crate::http_client::{DEFAULT_TIMEOUT, rest_client};
use crate::kingdom_stats::{
    KingdomProfile, KvkRecord, kvk_record_from_value, parse_kingdom_profiles_json,
};

const PAGE_SIZE: usize = 1000;
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct AtlasFetch {
    pub profiles: Vec<KingdomProfile>,
    pub history_rows: usize,
    pub errors: Vec<String>,
}

/// Pulls every kingdom row plus its KvK history from the Atlas REST API.
/// A failed history read is reported in `errors` and leaves profiles without history.
pub fn fetch_kingdom_profiles(cfg: &SupabaseConfig, cache: &mut HttpCache) -> Result<AtlasFetch> {
    let client = rest_client(cfg, DEFAULT_TIMEOUT)?;

    let mut profiles = Vec::new();
    for raw in fetch_pages(&client, cfg, cache, "kingdoms", "select=*&order=kingdom_number.asc")? {
        profiles.extend(parse_kingdom_profiles_json(&raw)?);
    }

    let mut out = AtlasFetch::default();
    match fetch_pages(
        &client,
        cfg,
        cache,
        "kvk_history",
        "select=*&order=kvk_number.desc",
    ) {
        Ok(pages) => {
            let mut rows = Vec::new();
            for raw in pages {
                match parse_kvk_history_json(&raw) {
                    Ok(mut page) => rows.append(&mut page),
                    Err(err) => out.errors.push(format!("kvk_history page: {err}")),
                }
            }
            out.history_rows = rows.len();
            attach_history(&mut profiles, rows);
        }
        Err(err) => out.errors.push(format!("kvk_history: {err:#}")),
    }

    out.profiles = profiles;
    Ok(out)
}

fn fetch_pages(
    client: &Client,
    cfg: &SupabaseConfig,
    cache: &mut HttpCache,
    table: &str,
    query: &str,
) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for page in 0..MAX_PAGES {
        let url = rest_url(cfg, table, query, page * PAGE_SIZE);
        let raw = cache
            .fetch_json(client, &url)
            .with_context(|| format!("fetch {table} page {page}"))?;
        let rows = count_rows(&raw);
        pages.push(raw);
        if rows < PAGE_SIZE {
            break;
        }
    }
    Ok(pages)
}

pub fn rest_url(cfg: &SupabaseConfig, table: &str, query: &str, offset: usize) -> String {
    format!(
        "{}/rest/v1/{table}?{query}&limit={PAGE_SIZE}&offset={offset}",
        cfg.url.trim_end_matches('/')
    )
}

fn count_rows(raw: &str) -> usize {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.as_array().map(Vec::len))
        .unwrap_or(0)
}

/// History rows keyed by the kingdom they belong to. Rows without a kingdom
/// number or that are not objects are skipped.
pub fn parse_kvk_history_json(raw: &str) -> Result<Vec<(u32, KvkRecord)>> {
    let value: Value = serde_json::from_str(raw).context("invalid kvk history json")?;
    let Some(items) = value.as_array() else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let kingdom = ["kingdom_number", "kingdomNumber"]
                .iter()
                .find_map(|k| item.get(*k))
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)?;
            Some((kingdom, kvk_record_from_value(item)?))
        })
        .collect())
}

/// History rows replace whatever history a profile row embedded.
pub fn attach_history(profiles: &mut [KingdomProfile], rows: Vec<(u32, KvkRecord)>) {
    let mut by_kingdom: HashMap<u32, Vec<KvkRecord>> = HashMap::new();
    for (kingdom, record) in rows {
        by_kingdom.entry(kingdom).or_default().push(record);
    }
    for profile in profiles.iter_mut() {
        if let Some(records) = by_kingdom.remove(&profile.kingdom_number) {
            profile.recent_kvks = records;
        }
    }
}
