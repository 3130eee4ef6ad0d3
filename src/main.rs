use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Utc};

use kingshot_atlas::atlas_score::Tier;
use kingshot_atlas::config::AtlasConfig;
use kingshot_atlas::fake_kingdoms::generate_kingdoms;
use kingshot_atlas::kingdom_stats::extract_stats;
use kingshot_atlas::kingdom_store;
use kingshot_atlas::leaderboard::{LeaderboardFilter, filter_leaderboard, tier_summary};
use kingshot_atlas::leaderboard_export::export_leaderboard;
use kingshot_atlas::persist;
use kingshot_atlas::state::AtlasState;

const DEMO_KINGDOMS: usize = 200;
const DEMO_SEED: u64 = 2025;

const USAGE: &str = "usage: kingshot_atlas [--db <path>] [--demo] [--json] [--verbose] <command>

commands:
  score <kingdom>
  predict <kingdom> [--vs <kingdom>]
  leaderboard [--tier S|A|B|C] [--limit N] [--min-kvks N]
  export <path.xlsx>
  calendar [--date YYYY-MM-DD]
  notifications
  dismiss <notification-id>
  dismiss-banner
  read-all";

const NEEDS_PROFILES: &[&str] = &["score", "predict", "leaderboard", "export"];

struct Args {
    db: Option<PathBuf>,
    demo: bool,
    json: bool,
    verbose: bool,
    rest: Vec<String>,
}

impl Args {
    fn parse() -> Self {
        let mut db = None;
        let mut demo = false;
        let mut json = false;
        let mut verbose = false;
        let mut rest = Vec::new();
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            if let Some(path) = arg.strip_prefix("--db=") {
                if !path.trim().is_empty() {
                    db = Some(PathBuf::from(path.trim()));
                }
            } else if arg == "--db" {
                db = it.next().filter(|v| !v.trim().is_empty()).map(PathBuf::from);
            } else if arg == "--demo" {
                demo = true;
            } else if arg == "--json" {
                json = true;
            } else if arg == "--verbose" {
                verbose = true;
            } else {
                rest.push(arg);
            }
        }
        Self {
            db,
            demo,
            json,
            verbose,
            rest,
        }
    }

    fn flag(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}=");
        for (idx, arg) in self.rest.iter().enumerate() {
            if let Some(v) = arg.strip_prefix(&prefix) {
                return Some(v);
            }
            if arg == name {
                return self.rest.get(idx + 1).map(String::as_str);
            }
        }
        None
    }

    fn positional(&self, idx: usize) -> Option<&str> {
        self.rest.get(idx).map(String::as_str)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let Some(command) = args.positional(0) else {
        println!("{USAGE}");
        return Ok(());
    };

    let cfg = AtlasConfig::load();
    let mut state = AtlasState::new(&cfg);
    let session_path = persist::session_path();
    if let Some(path) = session_path.as_deref() {
        persist::load_into_state(&mut state, path);
    }

    if NEEDS_PROFILES.contains(&command) {
        let profiles = if args.demo {
            generate_kingdoms(DEMO_KINGDOMS, DEMO_SEED)
        } else {
            let db_path = args
                .db
                .clone()
                .or_else(|| cfg.resolve_db_path())
                .context("unable to resolve sqlite path")?;
            let conn = kingdom_store::open_db(&db_path)?;
            let profiles = kingdom_store::load_all_profiles(&conn)?;
            if profiles.is_empty() {
                bail!(
                    "no kingdoms in {}; run atlas_ingest first or pass --demo",
                    db_path.display()
                );
            }
            profiles
        };
        state.load_profiles(profiles);
    }

    match command {
        "score" => cmd_score(&state, &args)?,
        "predict" => cmd_predict(&state, &args)?,
        "leaderboard" => cmd_leaderboard(&mut state, &args)?,
        "export" => cmd_export(&mut state, &args)?,
        "calendar" => cmd_calendar(&state, &cfg, &args)?,
        "notifications" => cmd_notifications(&state),
        "dismiss" => cmd_dismiss(&mut state, &args)?,
        "dismiss-banner" => {
            state.dismiss_countdown_banner();
            println!("Countdown banner hidden until the next KvK");
        }
        "read-all" => {
            state.mark_all_read();
            println!("All notifications marked read");
        }
        other => bail!("unknown command `{other}`\n\n{USAGE}"),
    }

    if args.verbose {
        for line in &state.logs {
            eprintln!("{line}");
        }
    }
    if let Some(path) = session_path.as_deref() {
        persist::save_from_state(&state, path);
    }
    Ok(())
}

fn kingdom_arg(args: &Args) -> Result<u32> {
    let raw = args
        .positional(1)
        .ok_or_else(|| anyhow!("missing kingdom number\n\n{USAGE}"))?;
    raw.parse::<u32>()
        .with_context(|| format!("invalid kingdom number `{raw}`"))
}

fn cmd_score(state: &AtlasState, args: &Args) -> Result<()> {
    let kingdom = kingdom_arg(args)?;
    let profile = state
        .profiles
        .get(&kingdom)
        .ok_or_else(|| anyhow!("kingdom {kingdom} is not tracked"))?;
    let stats = extract_stats(profile);
    let Some(score) = state.score(kingdom) else {
        bail!("kingdom {kingdom} is not tracked");
    };
    if args.json {
        let out = serde_json::json!({
            "kingdom_number": kingdom,
            "stats": stats,
            "score": score,
            "stored_score": profile.atlas_score,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Kingdom {kingdom}");
    println!("Atlas Score: {:.2} ({}-Tier)", score.final_score, score.tier);
    println!(
        "KvKs: {}  Prep {}-{} ({:.0}%)  Battle {}-{} ({:.0}%)",
        stats.total_kvks,
        stats.prep_wins,
        stats.prep_losses,
        score.prep_win_rate * 100.0,
        stats.battle_wins,
        stats.battle_losses,
        score.battle_win_rate * 100.0
    );
    println!(
        "Dominations: {}  Invasions: {}  Streaks: prep {} / battle {}",
        stats.dominations, stats.invasions, stats.current_prep_streak, stats.current_battle_streak
    );
    println!("Breakdown:");
    println!("  base        {:+.3}", score.base_score);
    println!("  domination  {:+.3}", score.domination_bonus);
    println!("  invasion    {:+.3}", -score.invasion_penalty);
    println!("  streak      {:+.3}", score.streak_bonus);
    println!("  experience  {:+.3}", score.experience_bonus);
    println!("  form        {:+.3}", score.form_bonus);
    if let Some(stored) = profile.atlas_score {
        println!("Stored score: {stored:.2} (drift {:+.2})", score.final_score - stored);
    }
    Ok(())
}

fn cmd_predict(state: &AtlasState, args: &Args) -> Result<()> {
    let kingdom = kingdom_arg(args)?;
    let opponent = args
        .flag("--vs")
        .map(|raw| {
            raw.parse::<u32>()
                .with_context(|| format!("invalid opponent kingdom `{raw}`"))
        })
        .transpose()?;
    let set = state.predict(kingdom, opponent)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    match opponent {
        Some(opp) => println!("Kingdom {kingdom} vs {opp}"),
        None => println!("Kingdom {kingdom}"),
    }
    println!(
        "Current: {:.2} ({}-Tier)  prep {:.0}%  battle {:.0}%",
        set.current_score,
        set.current_tier,
        set.prep_rate * 100.0,
        set.battle_rate * 100.0
    );
    for p in &set.predictions {
        println!(
            "  {:<10} {:>5.1}%  -> {:.2} ({:+.2}) {}-Tier{}",
            p.outcome.label(),
            p.probability * 100.0,
            p.projected_score,
            p.score_change,
            p.new_tier,
            if p.tier_change { " *" } else { "" }
        );
    }
    Ok(())
}

fn cmd_leaderboard(state: &mut AtlasState, args: &Args) -> Result<()> {
    let tier = args
        .flag("--tier")
        .map(|raw| Tier::parse(raw).ok_or_else(|| anyhow!("invalid tier `{raw}`")))
        .transpose()?;
    let limit = args
        .flag("--limit")
        .map(|raw| raw.parse::<usize>().with_context(|| format!("invalid limit `{raw}`")))
        .transpose()?
        .or(Some(25));
    let min_kvks = args
        .flag("--min-kvks")
        .map(|raw| raw.parse::<u32>().with_context(|| format!("invalid min-kvks `{raw}`")))
        .transpose()?
        .unwrap_or(0);

    let filter = LeaderboardFilter {
        tier,
        min_kvks,
        limit,
    };
    let rows = state.leaderboard();
    let shown = filter_leaderboard(rows, &filter);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }
    for row in shown {
        println!(
            "{:>4}. K{:<5} {:>5.2} {}-Tier  {} KvKs",
            row.rank,
            row.kingdom_number,
            row.score.final_score,
            row.score.tier,
            row.stats.total_kvks
        );
    }

    let summary = tier_summary(rows);
    let dist = Tier::ALL
        .iter()
        .map(|t| format!("{t}: {} ({:.0}%)", summary.count(*t), summary.share(*t) * 100.0))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{dist}");
    Ok(())
}

fn cmd_export(state: &mut AtlasState, args: &Args) -> Result<()> {
    let path = args
        .positional(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("missing output path\n\n{USAGE}"))?;
    let report = export_leaderboard(&path, state.leaderboard())?;
    println!(
        "Exported {} kingdoms ({} prediction rows) to {}",
        report.kingdoms,
        report.prediction_rows,
        path.display()
    );
    Ok(())
}

fn cmd_calendar(state: &AtlasState, cfg: &AtlasConfig, args: &Args) -> Result<()> {
    let status = match args.flag("--date") {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("invalid date `{raw}`"))?;
            let at = date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or_else(Utc::now);
            cfg.calendar().status(at)
        }
        None => state.phase_status(),
    };
    println!("KvK #{}: {}", status.cycle, status.phase.label());
    println!(
        "{} in {} ({})",
        status.next_phase.label(),
        status.countdown.label(),
        status.next_change_at.format("%Y-%m-%d %H:%M UTC")
    );
    if args.flag("--date").is_none()
        && let Some(banner) = state.countdown_banner()
    {
        println!("{banner}");
    }
    Ok(())
}

fn cmd_notifications(state: &AtlasState) {
    let groups = state.grouped_notifications();
    if groups.is_empty() {
        println!("No notifications");
        return;
    }
    for g in &groups {
        println!(
            "[{}] {} {}{}",
            g.newest_at.format("%m-%d %H:%M"),
            g.latest.id,
            g.summary(),
            if g.unread > 0 { " (unread)" } else { "" }
        );
    }
}

fn cmd_dismiss(state: &mut AtlasState, args: &Args) -> Result<()> {
    let id = args
        .positional(1)
        .ok_or_else(|| anyhow!("missing notification id\n\n{USAGE}"))?;
    let hidden = state.dismiss_group(id);
    println!("Dismissed {hidden} notification(s)");
    Ok(())
}
