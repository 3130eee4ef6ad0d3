use std::path::PathBuf;

use anyhow::{Context, Result};

use kingshot_atlas::atlas_fetch::fetch_kingdom_profiles;
use kingshot_atlas::config::AtlasConfig;
use kingshot_atlas::fake_kingdoms::generate_kingdoms;
use kingshot_atlas::http_cache::HttpCache;
use kingshot_atlas::kingdom_store;
use kingshot_atlas::persist;
use kingshot_atlas::state::AtlasState;

const DEMO_KINGDOMS: usize = 200;
const DEMO_SEED: u64 = 2025;

fn main() -> Result<()> {
    let cfg = AtlasConfig::load();
    let db_path = parse_db_path_arg()
        .or_else(|| cfg.resolve_db_path())
        .context("unable to resolve sqlite path")?;

    let (profiles, history_rows, errors) = if has_flag("--demo") {
        let profiles = generate_kingdoms(DEMO_KINGDOMS, DEMO_SEED);
        let rows = profiles.iter().map(|p| p.recent_kvks.len()).sum::<usize>();
        (profiles, rows, Vec::new())
    } else {
        let supabase = cfg.supabase()?;
        let mut cache = HttpCache::open_default();
        let fetched = fetch_kingdom_profiles(&supabase, &mut cache)?;
        (fetched.profiles, fetched.history_rows, fetched.errors)
    };

    let mut conn = kingdom_store::open_db(&db_path)?;

    // Diff against what is already stored so returning users see what moved.
    let mut state = AtlasState::new(&cfg);
    let session_path = persist::session_path();
    if let Some(path) = session_path.as_deref() {
        persist::load_into_state(&mut state, path);
    }
    state.load_profiles(kingdom_store::load_all_profiles(&conn)?);
    let raised = state.apply_profile_updates(profiles.clone());

    let summary = kingdom_store::ingest_profiles(&mut conn, db_path.clone(), &profiles, errors)?;
    if let Some(path) = session_path.as_deref() {
        persist::save_from_state(&state, path);
    }

    println!("Atlas ingest complete");
    println!("DB: {}", summary.db_path.display());
    println!("Run: {}", summary.run_id);
    println!("Kingdoms upserted: {}", summary.kingdoms_upserted);
    println!(
        "History rows: {} stored / {} fetched",
        summary.history_rows, history_rows
    );
    println!("Kingdoms in db: {}", kingdom_store::count_profiles(&conn)?);
    println!("Notifications raised: {raised}");
    if !summary.errors.is_empty() {
        println!("errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(6) {
            println!(" - {err}");
        }
    }

    Ok(())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
