//! Progress display for the matching loop.
//!
//! Bars and spinners are hidden in log-only mode; periodic `[phase] n/total`
//! lines are logged instead so that redirected output stays readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Set once from the command line
static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "850ms", "4.2s" or "3.1m"
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

fn hidden_if_log_only(pb: &ProgressBar) -> bool {
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return true;
    }
    false
}

/// Bar over `len` tracks.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if !hidden_if_log_only(&pb) {
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} (ETA: {eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
    }
    pb.set_message(msg.to_string());
    pb
}

/// Spinner for waits of unknown length, such as the library snapshot.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !hidden_if_log_only(&pb) {
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Whether a `[phase] n/total` line is due at `current`.
pub fn progress_due(current: u64, total: u64, interval: u64) -> bool {
    total > 0 && (current == total || (interval > 0 && current % interval == 0))
}

/// Log-only replacement for the bar.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && progress_due(current, total, interval) {
        let pct = 100.0 * current as f64 / total as f64;
        info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}
