use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use repairsync_core::remote::RawObjectMap;
use repairsync_core::{EngineRegistry, EventBus, FileLocalStore, LoadOutcome, MemoryRemoteStore};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::error::CliError;
use crate::settings::Context;

/// How often `--follow` checks the fixture for edits.
const FIXTURE_POLL_INTERVAL: Duration = Duration::from_secs(1);

type FixtureTree = BTreeMap<String, RawObjectMap>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub kind: String,
    /// `None` when the engine had already been initialized
    pub outcome: Option<LoadOutcome>,
    pub records: usize,
}

pub async fn run_replay(
    fixture: &Path,
    kind: Option<&str>,
    as_json: bool,
    follow: bool,
    context: &Context,
) -> Result<(), CliError> {
    let tree = load_fixture(fixture)?;
    let remote = Arc::new(MemoryRemoteStore::with_tree(tree.clone()));
    let local = Arc::new(FileLocalStore::open(&context.cache_dir)?);
    let registry = EngineRegistry::new(
        remote.clone(),
        local,
        EventBus::default(),
        context.engine_configs(kind)?,
    )?;

    let reports = replay(&registry).await;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for line in format_report_lines(&reports) {
            println!("{line}");
        }
    }

    if follow {
        follow_changes(&registry, &remote, fixture, tree).await?;
    }

    let flushed = registry.flush_all();
    tracing::info!(flushed, "Replay finished");
    Ok(())
}

pub async fn replay(registry: &EngineRegistry) -> Vec<ReplayReport> {
    registry
        .init_all()
        .await
        .into_iter()
        .map(|(kind, outcome)| {
            let records = registry.get(&kind).map_or(0, |engine| engine.len());
            ReplayReport {
                kind,
                outcome,
                records,
            }
        })
        .collect()
}

/// Parse a `{ "<path>": { "<id>": record } }` fixture.
pub fn load_fixture(path: &Path) -> Result<FixtureTree, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|error| CliError::InvalidFixture {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    parse_fixture(&raw).map_err(|reason| CliError::InvalidFixture {
        path: path.to_path_buf(),
        reason,
    })
}

pub fn parse_fixture(raw: &str) -> Result<FixtureTree, String> {
    serde_json::from_str(raw).map_err(|error| error.to_string())
}

pub fn format_report_lines(reports: &[ReplayReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| {
            let outcome = match &report.outcome {
                None => "already initialized".to_string(),
                Some(LoadOutcome::FullLoad { records }) => format!("full load ({records} read)"),
                Some(LoadOutcome::Resumed {
                    resume_point,
                    delta_applied: Some(applied),
                }) => format!("resumed from {resume_point} ({applied} applied)"),
                Some(LoadOutcome::Resumed {
                    resume_point,
                    delta_applied: None,
                }) => format!("resumed from {resume_point} (delta failed, offline)"),
                Some(LoadOutcome::CacheOnly) => "cache only (remote unreachable)".to_string(),
            };
            format!("{:<10} {:>5} records  {outcome}", report.kind, report.records)
        })
        .collect()
}

/// Push the difference between two fixture snapshots into `remote` as
/// another client would: changed or new children are written, vanished ones
/// are physically removed. Returns how many children changed.
pub fn apply_fixture_edits(
    remote: &MemoryRemoteStore,
    previous: &FixtureTree,
    next: &FixtureTree,
) -> usize {
    let mut applied = 0;
    for (path, children) in next {
        let before = previous.get(path);
        for (id, value) in children {
            if before.and_then(|children| children.get(id)) != Some(value) {
                remote.put(path, id, value.clone());
                applied += 1;
            }
        }
    }
    for (path, children) in previous {
        let after = next.get(path);
        for id in children.keys() {
            if !after.is_some_and(|children| children.contains_key(id)) {
                remote.delete(path, id);
                applied += 1;
            }
        }
    }
    applied
}

/// Print bus events and replay fixture edits until Ctrl-C.
async fn follow_changes(
    registry: &EngineRegistry,
    remote: &MemoryRemoteStore,
    fixture: &Path,
    mut current: FixtureTree,
) -> Result<(), CliError> {
    let mut events = registry.bus().subscribe();
    let mut poll = tokio::time::interval(FIXTURE_POLL_INTERVAL);
    let mut seen = modified_at(fixture);
    println!(
        "Following {}, press Ctrl-C to flush and exit",
        fixture.display()
    );
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Interrupted, flushing caches");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => println!(
                    "{} {:?} {} change(s)",
                    event.kind, event.source, event.changes
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event bus lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = poll.tick() => {
                let modified = modified_at(fixture);
                if modified == seen {
                    continue;
                }
                seen = modified;
                match load_fixture(fixture) {
                    Ok(next) => {
                        let applied = apply_fixture_edits(remote, &current, &next);
                        tracing::info!(applied, "Fixture edits pushed to remote");
                        current = next;
                    }
                    Err(error) => tracing::warn!("Ignoring fixture edit: {error}"),
                }
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
