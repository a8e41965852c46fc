//! CLI command handlers.

pub mod config;
pub mod run;
pub mod simulate;

use console::{Style, style};
use lsc_cache::{CacheConfig, CacheStats};
use lsc_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration and the files it came from.
    pub loaded: LoadedConfig,
}

impl Context {
    /// Cache configuration from the `[session]` section.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from_provider(&self.loaded.config.session_or_default())
    }
}

/// Print cache statistics as an aligned table.
pub fn print_stats(title: &str, stats: &CacheStats) {
    let dim = Style::new().dim();
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    };

    println!();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(48)));
    println!(
        "  {:<28} {}",
        dim.apply_to("Active sessions:"),
        stats.active_sessions_count
    );
    println!();
    println!("  {}", style("Sessions collection job").underlined());
    println!(
        "  {:<28} {}",
        dim.apply_to("Runs:"),
        stats.sessions_collection_job_count
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Last run:"),
        timestamp(stats.last_sessions_collection_job_timestamp)
    );
    println!(
        "  {:<28} {} ms",
        dim.apply_to("Duration:"),
        stats.last_sessions_collection_job_duration_millis
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Refreshed:"),
        stats.last_sessions_collection_job_entries_refreshed
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Ended:"),
        stats.last_sessions_collection_job_entries_ended
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Cursors closed:"),
        stats.last_sessions_collection_job_cursors_closed
    );
    println!();
    println!("  {}", style("Transaction reaper job").underlined());
    println!(
        "  {:<28} {}",
        dim.apply_to("Runs:"),
        stats.transaction_reaper_job_count
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Last run:"),
        timestamp(stats.last_transaction_reaper_job_timestamp)
    );
    println!(
        "  {:<28} {} ms",
        dim.apply_to("Duration:"),
        stats.last_transaction_reaper_job_duration_millis
    );
    println!(
        "  {:<28} {}",
        dim.apply_to("Cleaned up:"),
        stats.last_transaction_reaper_job_entries_cleaned_up
    );
    println!();
}
