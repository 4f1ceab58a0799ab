pub mod analyzer;
pub mod codes;
pub mod config;
pub mod context;
pub mod genres;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod weather;

/// Application name for XDG paths
pub const APP_NAME: &str = "moodshift";
