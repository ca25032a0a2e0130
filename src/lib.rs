//! djsync - copy djay's BPM and key analysis into the Apple Music library.

pub mod config;
pub mod djay;
pub mod error;
pub mod keymap;
pub mod library;
pub mod matcher;
pub mod models;
pub mod music_app;
pub mod normalize;
pub mod policy;
pub mod progress;
pub mod report;
pub mod safety;
pub mod similarity;
pub mod sync;

/// Application name for XDG paths
pub const APP_NAME: &str = "djsync";
