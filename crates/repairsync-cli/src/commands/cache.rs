use std::path::Path;
use std::sync::Arc;

use repairsync_core::{EngineConfig, FileLocalStore, LocalCacheStore};
use serde::Serialize;

use crate::cli::CacheCommands;
use crate::error::CliError;
use crate::settings::Context;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub kind: String,
    pub records_key: String,
    /// `None` when no usable records blob exists
    pub records: Option<usize>,
    pub saved_at: Option<i64>,
    pub resume_point: Option<String>,
    pub stream_start_at: Option<String>,
}

pub fn run_cache(command: CacheCommands, context: &Context) -> Result<(), CliError> {
    match command {
        CacheCommands::Show { kind, json } => {
            let configs = context.engine_configs(kind.as_deref())?;
            let summaries = summarize_caches(&context.cache_dir, &configs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No collections configured.");
            } else {
                for line in format_summary_lines(&summaries) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        CacheCommands::Clear { kind } => {
            let configs = context.engine_configs(kind.as_deref())?;
            let cleared = clear_caches(&context.cache_dir, &configs)?;
            println!(
                "Cleared {cleared} cached collection(s) for scope '{}'",
                context.scope
            );
            Ok(())
        }
    }
}

pub fn summarize_caches(
    cache_dir: &Path,
    configs: &[EngineConfig],
) -> Result<Vec<CacheSummary>, CliError> {
    let cache = open_cache(cache_dir)?;
    Ok(configs
        .iter()
        .map(|config| {
            let keys = config.cache_keys();
            let snapshot = cache.load(&keys);
            let meta = snapshot.meta.as_ref();
            CacheSummary {
                kind: config.kind.clone(),
                records_key: keys.records,
                records: snapshot.records.as_ref().map(Vec::len),
                saved_at: meta.map(|meta| meta.saved_at).filter(|saved| *saved > 0),
                resume_point: meta.and_then(|meta| meta.resume_point().map(str::to_string)),
                stream_start_at: meta
                    .map(|meta| meta.stream_start_at.clone())
                    .filter(|start| !start.is_empty()),
            }
        })
        .collect())
}

/// Remove both blobs for every config. Returns how many collections had a
/// records blob before clearing.
pub fn clear_caches(cache_dir: &Path, configs: &[EngineConfig]) -> Result<usize, CliError> {
    let cache = open_cache(cache_dir)?;
    let mut cleared = 0;
    for config in configs {
        let keys = config.cache_keys();
        if cache.load(&keys).has_records() {
            cleared += 1;
        }
        cache.clear(&keys);
        tracing::info!(kind = %config.kind, "Cleared cache");
    }
    Ok(cleared)
}

pub fn format_summary_lines(summaries: &[CacheSummary]) -> Vec<String> {
    summaries
        .iter()
        .map(|summary| {
            let records = summary
                .records
                .map_or_else(|| "no cache".to_string(), |count| format!("{count} records"));
            let saved = summary
                .saved_at
                .map_or_else(|| "never".to_string(), format_timestamp);
            let resume = summary.resume_point.as_deref().unwrap_or("-");
            format!(
                "{:<10} {records:<12} saved {saved}  resume {resume}",
                summary.kind
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn open_cache(cache_dir: &Path) -> Result<LocalCacheStore, CliError> {
    let store = FileLocalStore::open(cache_dir)?;
    Ok(LocalCacheStore::new(Arc::new(store)))
}
