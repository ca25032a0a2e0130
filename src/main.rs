use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use djsync::config::AppConfig;
use djsync::library::{save_snapshot, JsonLibrary, LibraryCatalog, TargetLibrary};
use djsync::models::{OverwriteMode, RunSummary};
use djsync::music_app::MusicApp;
use djsync::progress::{format_duration, set_log_only};
use djsync::report;
use djsync::safety::validate_report_path;
use djsync::sync::{run_sync, RunConfig};

/// Tracks shown in the dry-run preview
const PREVIEW_ROWS: usize = 25;

#[derive(Parser)]
#[command(name = "djsync", version)]
#[command(about = "Copy djay BPM and key analysis into Apple Music (BPM and Comments)")]
struct Args {
    /// Path to djay's MediaLibrary.db
    #[arg(long)]
    db: Option<PathBuf>,

    /// List djay playlists and exit
    #[arg(long)]
    list_playlists: bool,

    /// Exact djay playlist name
    #[arg(long)]
    playlist: Option<String>,

    /// Only process the first N playlist tracks (0 = all)
    #[arg(long, default_value = "0")]
    limit: usize,

    /// Write to the library (default is a dry run)
    #[arg(long)]
    apply: bool,

    /// Only fill BPM/Comments that are currently empty
    #[arg(long)]
    no_overwrite: bool,

    /// Use a JSON library snapshot instead of the Music app
    #[arg(long)]
    library_json: Option<PathBuf>,

    /// Save the Music library snapshot as JSON and exit
    #[arg(long)]
    export_library: Option<PathBuf>,

    /// Print tracks that were not written
    #[arg(long)]
    report_skipped: bool,

    /// Max rows in the skipped report
    #[arg(long, default_value = "50")]
    report_limit: usize,

    /// Write skipped/unmatched tracks to CSV
    #[arg(long)]
    report_skipped_csv: Option<PathBuf>,

    /// Write every processed track (or the playlist list) to CSV
    #[arg(long)]
    report_all_csv: Option<PathBuf>,

    /// Write run stats as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Config file (default: ~/.config/djsync/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hide progress bars, log progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!("\n{:=<60}", "");
    println!(
        "Playlist: {}  ({})",
        summary.playlist.as_deref().unwrap_or("-"),
        if summary.dry_run { "dry run" } else { "applied" }
    );
    println!("  Playlist tracks:   {}", stats.playlist_tracks);
    println!("  Processed:         {}", stats.processed);
    println!(
        "  {:<18} {}",
        if summary.dry_run { "Would update:" } else { "Updated:" },
        stats.matched_applied
    );
    println!("  Matched, skipped:  {}", stats.matched_skipped);
    println!("  Ambiguous:         {}", stats.ambiguous);
    println!("  Unmatched:         {}", stats.unmatched);
    if !summary.dry_run {
        println!("  Write failures:    {}", stats.write_failures);
    }
    println!("  Match rate:        {:.1}%", stats.match_rate());
    println!(
        "  Elapsed:           {}",
        format_duration(Duration::from_secs_f64(stats.elapsed_seconds))
    );
    println!("{:=<60}", "");
}

const MISSING_DB: &str = "Provide --db PATH to djay's MediaLibrary.db";

/// Reject flag combinations before touching any library.
fn check_args(args: &Args) -> Result<()> {
    if args.export_library.is_some() {
        return Ok(());
    }
    if args.db.is_none() {
        bail!(MISSING_DB);
    }
    if args.list_playlists {
        if args.report_skipped_csv.is_some() {
            bail!("--report-skipped-csv has no rows with --list-playlists; use --report-all-csv");
        }
    } else if args.playlist.is_none() {
        bail!("Provide --playlist NAME, or use --list-playlists");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    check_args(&args)?;

    let log_level = match (args.verbose, args.log_only) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();
    set_log_only(args.log_only);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load config")?;

    if let Some(out) = &args.export_library {
        if out.extension().and_then(|e| e.to_str()) != Some("json") {
            bail!("Export path '{}' must have a .json extension", out.display());
        }
        let tracks = MusicApp::new()
            .load_library_tracks()
            .context("Failed to read the Music library")?;
        save_snapshot(&tracks, out).context("Failed to write library snapshot")?;
        println!("Saved {} library tracks to {}", tracks.len(), out.display());
        return Ok(());
    }

    let db = args.db.clone().context(MISSING_DB)?;
    for path in [&args.report_skipped_csv, &args.report_all_csv].into_iter().flatten() {
        validate_report_path(path, &db)?;
    }

    let mut library: Box<dyn TargetLibrary> = match &args.library_json {
        Some(path) => Box::new(
            JsonLibrary::open(path).context("Failed to open library snapshot")?,
        ),
        None => Box::new(MusicApp::new()),
    };

    let run_config = RunConfig {
        db_path: db,
        playlist: args.playlist.clone(),
        apply: args.apply,
        overwrite_mode: if args.no_overwrite {
            OverwriteMode::PreserveExisting
        } else {
            OverwriteMode::OverwriteAll
        },
        limit: (args.limit > 0).then_some(args.limit),
        list_playlists: args.list_playlists,
        matching: config.matching,
    };

    let summary = run_sync(&run_config, library.as_mut()).context("Sync failed")?;

    if args.list_playlists {
        for name in &summary.playlists {
            println!("{}", name);
        }
        if let Some(path) = &args.report_all_csv {
            report::write_csv(&report::playlist_rows(&summary.playlists), path)
                .context("Failed to write playlist CSV")?;
            println!("Wrote {} playlists to {}", summary.playlists.len(), path.display());
        }
        return Ok(());
    }

    print!("{}", report::format_preview(&summary, PREVIEW_ROWS));
    if summary.tracks.len() > PREVIEW_ROWS {
        println!("... ({} more)", summary.tracks.len() - PREVIEW_ROWS);
    }
    print_summary(&summary);

    if args.report_skipped {
        report::print_skipped_report(&summary, args.report_limit);
    }
    if let Some(path) = &args.report_skipped_csv {
        let rows = report::skipped_rows(&summary);
        report::write_csv(&rows, path).context("Failed to write skipped CSV")?;
        println!("Wrote {} skipped rows to {}", rows.len(), path.display());
    }
    if let Some(path) = &args.report_all_csv {
        let rows = report::all_rows(&summary);
        report::write_csv(&rows, path).context("Failed to write CSV")?;
        println!("Wrote {} rows to {}", rows.len(), path.display());
    }

    if log::log_enabled!(log::Level::Debug) {
        summary.stats.log_phase("final");
    }
    if let Some(path) = &args.stats_json {
        summary
            .stats
            .write_to_file(path)
            .context("Failed to write stats JSON")?;
    }

    if summary.dry_run {
        println!("\nDry run only. Re-run with --apply to write to Music.");
    }
    Ok(())
}
