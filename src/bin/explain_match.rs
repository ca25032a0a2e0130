//! Show how one djay track scores against a library snapshot.
//!
//! Usage: explain-match --library-json <library.json> --title T --artist A [--duration S]

use anyhow::{Context, Result};
use clap::Parser;
use rustc_hash::FxHashSet;
use std::path::PathBuf;

use djsync::config::AppConfig;
use djsync::library::{JsonLibrary, LibraryCatalog};
use djsync::matcher::{duration_score, Matcher, TargetIndex};
use djsync::models::{AnalysisSource, MatchResult, SourceTrack};
use djsync::normalize::comparison_key;

#[derive(Parser)]
#[command(name = "explain-match")]
#[command(about = "Explain candidate scoring for one track against a library snapshot")]
struct Args {
    /// Library snapshot (see `djsync --export-library`)
    #[arg(long)]
    library_json: PathBuf,

    #[arg(long)]
    title: String,

    #[arg(long)]
    artist: String,

    /// Track duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Config file with [matching] overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also list candidates that fail a gate
    #[arg(long)]
    all: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let mut library =
        JsonLibrary::open(&args.library_json).context("Failed to open library snapshot")?;
    let targets = library.load_library_tracks()?;

    let source = SourceTrack {
        id: "cli".to_string(),
        title: args.title.clone(),
        artist: args.artist.clone(),
        album: None,
        duration_sec: args.duration,
        bpm: None,
        key: None,
        analysis_source: AnalysisSource::None,
    };
    let key = comparison_key(Some(source.title.as_str()), Some(source.artist.as_str()));
    println!("Normalized: title={:?} artist={:?}", key.title, key.artist);

    let matcher = Matcher::new(config.matching);
    let gates = matcher.config();
    println!(
        "Gates: title >= {:.2}, artist >= {:.2}, duration delta <= {:.1}s ({})",
        gates.title_threshold,
        gates.artist_threshold,
        gates.max_duration_delta_secs,
        gates.similarity.build().name()
    );
    let index = TargetIndex::new(&targets);
    let candidates = if matcher.can_use_token_index() {
        index.candidates(&source.title)
    } else {
        index.all()
    };
    println!(
        "{} of {} library tracks share a title token\n",
        candidates.len(),
        index.len()
    );

    println!(
        "{:<6} {:>6} {:>6} {:>7} {:>6}  {}",
        "gate", "title", "artist", "delta", "dur", "track"
    );
    for target in &candidates {
        let c = matcher.score(&key, &source, target);
        let eligible = matcher.is_eligible(&c);
        if !eligible && !args.all {
            continue;
        }
        let delta = c
            .duration_delta
            .map(|d| format!("{:.1}s", d))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<6} {:>6.2} {:>6.2} {:>7} {:>6.2}  {} - {} [{}]",
            if eligible { "pass" } else { "fail" },
            c.title_similarity,
            c.artist_similarity,
            delta,
            duration_score(c.duration_delta),
            target.artist,
            target.title,
            target.id
        );
    }

    println!();
    match matcher.match_track(&source, candidates, &FxHashSet::default()) {
        MatchResult::Matched {
            target,
            confidence,
            tie_broken,
            ..
        } => println!(
            "=> matched {} ({} - {}), confidence {:.2}{}",
            target.id,
            target.artist,
            target.title,
            confidence,
            if tie_broken { ", tie broken" } else { "" }
        ),
        MatchResult::Ambiguous { candidates, .. } => {
            println!("=> ambiguous between {} candidates", candidates.len())
        }
        MatchResult::Unmatched { reason, .. } => println!("=> unmatched: {}", reason),
    }
    Ok(())
}
