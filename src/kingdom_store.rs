use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::http_cache::app_cache_dir;
use crate::kingdom_stats::{KingdomProfile, KvkRecord, PhaseResult};

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub db_path: PathBuf,
    pub run_id: i64,
    pub kingdoms_upserted: usize,
    pub history_rows: usize,
    pub errors: Vec<String>,
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("kingdoms.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS kingdoms (
            kingdom_number INTEGER PRIMARY KEY,
            total_kvks INTEGER NULL,
            prep_wins INTEGER NULL,
            prep_losses INTEGER NULL,
            battle_wins INTEGER NULL,
            battle_losses INTEGER NULL,
            dominations INTEGER NULL,
            invasions INTEGER NULL,
            prep_streak INTEGER NULL,
            battle_streak INTEGER NULL,
            atlas_score REAL NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kvk_history (
            kingdom_number INTEGER NOT NULL,
            position INTEGER NOT NULL,
            kvk_number INTEGER NULL,
            opponent_kingdom INTEGER NULL,
            prep_result TEXT NULL,
            battle_result TEXT NULL,
            kvk_date TEXT NULL,
            PRIMARY KEY (kingdom_number, position)
        );
        CREATE INDEX IF NOT EXISTS idx_history_kvk ON kvk_history(kvk_number);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            kingdoms_upserted INTEGER NOT NULL,
            history_rows INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("init sqlite schema")?;
    Ok(())
}

/// Writes profiles and replaces their stored history in one transaction.
pub fn upsert_profiles(conn: &mut Connection, profiles: &[KingdomProfile]) -> Result<usize> {
    let tx = conn.transaction().context("begin upsert transaction")?;
    for profile in profiles {
        upsert_profile(&tx, profile)?;
    }
    tx.commit().context("commit upsert transaction")?;
    Ok(profiles.len())
}

fn upsert_profile(tx: &Transaction<'_>, p: &KingdomProfile) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO kingdoms (
            kingdom_number, total_kvks, prep_wins, prep_losses, battle_wins, battle_losses,
            dominations, invasions, prep_streak, battle_streak, atlas_score, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(kingdom_number) DO UPDATE SET
            total_kvks = excluded.total_kvks,
            prep_wins = excluded.prep_wins,
            prep_losses = excluded.prep_losses,
            battle_wins = excluded.battle_wins,
            battle_losses = excluded.battle_losses,
            dominations = excluded.dominations,
            invasions = excluded.invasions,
            prep_streak = excluded.prep_streak,
            battle_streak = excluded.battle_streak,
            atlas_score = excluded.atlas_score,
            updated_at = excluded.updated_at
        "#,
        params![
            p.kingdom_number,
            p.total_kvks,
            p.prep_wins,
            p.prep_losses,
            p.battle_wins,
            p.battle_losses,
            p.dominations,
            p.invasions,
            p.prep_streak,
            p.battle_streak,
            p.atlas_score,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("upsert kingdom {}", p.kingdom_number))?;

    tx.execute(
        "DELETE FROM kvk_history WHERE kingdom_number = ?1",
        params![p.kingdom_number],
    )
    .context("clear kvk history")?;

    for (position, r) in p.recent_kvks.iter().enumerate() {
        tx.execute(
            r#"
            INSERT INTO kvk_history (
                kingdom_number, position, kvk_number, opponent_kingdom,
                prep_result, battle_result, kvk_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                p.kingdom_number,
                position as i64,
                r.kvk_number,
                r.opponent_kingdom,
                r.prep_result.map(phase_to_str),
                r.battle_result.map(phase_to_str),
                r.kvk_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )
        .context("insert kvk history row")?;
    }
    Ok(())
}

pub fn load_profile(conn: &Connection, kingdom_number: u32) -> Result<Option<KingdomProfile>> {
    let profile = conn
        .query_row(
            &format!("{PROFILE_SELECT} WHERE kingdom_number = ?1"),
            params![kingdom_number],
            profile_from_row,
        )
        .optional()
        .context("query kingdom")?;
    let Some(mut profile) = profile else {
        return Ok(None);
    };
    profile.recent_kvks = load_history(conn, Some(kingdom_number))?
        .remove(&kingdom_number)
        .unwrap_or_default();
    Ok(Some(profile))
}

pub fn load_all_profiles(conn: &Connection) -> Result<Vec<KingdomProfile>> {
    let mut stmt = conn
        .prepare(&format!("{PROFILE_SELECT} ORDER BY kingdom_number ASC"))
        .context("prepare load kingdoms query")?;
    let rows = stmt
        .query_map([], profile_from_row)
        .context("query load kingdoms")?;

    let mut history = load_history(conn, None)?;
    let mut out = Vec::new();
    for row in rows {
        let mut profile = row.context("decode kingdom row")?;
        profile.recent_kvks = history.remove(&profile.kingdom_number).unwrap_or_default();
        out.push(profile);
    }
    Ok(out)
}

pub fn count_profiles(conn: &Connection) -> Result<usize> {
    let n = conn
        .query_row("SELECT COUNT(*) FROM kingdoms", [], |row| row.get::<_, i64>(0))
        .context("count kingdoms")?;
    Ok(n.max(0) as usize)
}

const PROFILE_SELECT: &str = r#"
    SELECT
        kingdom_number, total_kvks, prep_wins, prep_losses, battle_wins, battle_losses,
        dominations, invasions, prep_streak, battle_streak, atlas_score
    FROM kingdoms
"#;

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KingdomProfile> {
    Ok(KingdomProfile {
        kingdom_number: row.get(0)?,
        total_kvks: row.get(1)?,
        prep_wins: row.get(2)?,
        prep_losses: row.get(3)?,
        battle_wins: row.get(4)?,
        battle_losses: row.get(5)?,
        dominations: row.get(6)?,
        invasions: row.get(7)?,
        prep_streak: row.get(8)?,
        battle_streak: row.get(9)?,
        atlas_score: row.get(10)?,
        recent_kvks: Vec::new(),
    })
}

fn load_history(
    conn: &Connection,
    kingdom_number: Option<u32>,
) -> Result<HashMap<u32, Vec<KvkRecord>>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT kingdom_number, kvk_number, opponent_kingdom, prep_result, battle_result, kvk_date
            FROM kvk_history
            WHERE (?1 IS NULL OR kingdom_number = ?1)
            ORDER BY kingdom_number ASC, position ASC
            "#,
        )
        .context("prepare load history query")?;
    let rows = stmt
        .query_map(params![kingdom_number], |row| {
            let prep: Option<String> = row.get(3)?;
            let battle: Option<String> = row.get(4)?;
            let date: Option<String> = row.get(5)?;
            Ok((
                row.get::<_, u32>(0)?,
                KvkRecord {
                    kvk_number: row.get(1)?,
                    opponent_kingdom: row.get(2)?,
                    prep_result: prep.as_deref().and_then(phase_from_str),
                    battle_result: battle.as_deref().and_then(phase_from_str),
                    kvk_date: date
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                },
            ))
        })
        .context("query load history")?;

    let mut out: HashMap<u32, Vec<KvkRecord>> = HashMap::new();
    for row in rows {
        let (kingdom, record) = row.context("decode history row")?;
        out.entry(kingdom).or_default().push(record);
    }
    Ok(out)
}

pub fn record_ingest_run(
    conn: &Connection,
    started_at: &str,
    kingdoms_upserted: usize,
    history_rows: usize,
    errors: &[String],
) -> Result<i64> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, kingdoms_upserted, history_rows, errors_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            started_at,
            Utc::now().to_rfc3339(),
            kingdoms_upserted as i64,
            history_rows as i64,
            errors_json
        ],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn ingest_profiles(
    conn: &mut Connection,
    db_path: PathBuf,
    profiles: &[KingdomProfile],
    errors: Vec<String>,
) -> Result<IngestSummary> {
    let started_at = Utc::now().to_rfc3339();
    let kingdoms_upserted = upsert_profiles(conn, profiles)?;
    let history_rows = profiles.iter().map(|p| p.recent_kvks.len()).sum();
    let run_id = record_ingest_run(conn, &started_at, kingdoms_upserted, history_rows, &errors)?;
    Ok(IngestSummary {
        db_path,
        run_id,
        kingdoms_upserted,
        history_rows,
        errors,
    })
}

fn phase_to_str(result: PhaseResult) -> &'static str {
    match result {
        PhaseResult::Win => "W",
        PhaseResult::Loss => "L",
    }
}

fn phase_from_str(raw: &str) -> Option<PhaseResult> {
    match raw {
        "W" => Some(PhaseResult::Win),
        "L" => Some(PhaseResult::Loss),
        _ => None,
    }
}
