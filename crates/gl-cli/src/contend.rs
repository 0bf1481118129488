//! `greenlight contend`: concurrent optimistic updates to one record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Args;
use gl_store::{
    retry_on_conflict, MemoryStore, MovieUpdate, NewMovie, RecordId, UpdateCoordinator,
    UpdateError, VersionedStore,
};
use gl_telemetry::metrics::UpdateTimer;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ContendArgs {
    /// Number of concurrent writers.
    #[arg(long, default_value = "8")]
    writers: u32,

    /// Retries per writer after a conflict.
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Simulated store latency for each conditional write, in milliseconds.
    #[arg(long, default_value = "0")]
    write_delay_ms: u64,

    /// Output format: json (machine-readable) or human (pretty-printed).
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ContendReport {
    generated_at: DateTime<Utc>,
    record_id: RecordId,
    writers: u32,
    max_attempts: u32,
    successes: u64,
    /// Conflicts observed across all attempts.
    conflicts: u64,
    /// Writers whose last attempt still conflicted.
    gave_up: u64,
    /// Writers that failed with a store error.
    failed: u64,
    final_version: u64,
    genres: Vec<String>,
}

fn seed_movie() -> NewMovie {
    NewMovie {
        title: "Casablanca".to_string(),
        year: 1947,
        runtime: 102,
        genres: vec!["drama".to_string()],
    }
}

pub async fn run(config: &ServiceConfig, args: ContendArgs) -> anyhow::Result<()> {
    if args.writers == 0 {
        bail!("--writers must be at least 1");
    }

    let store = Arc::new(MemoryStore::new());
    store.set_write_delay(Duration::from_millis(args.write_delay_ms));
    let movie = seed_movie().into_movie().context("seed movie is invalid")?;
    let seeded = store.insert(movie).await.context("failed to seed the store")?;
    let id = seeded.id;

    let coordinator = Arc::new(UpdateCoordinator::new(
        Arc::clone(&store),
        config.store.clone(),
    ));
    let max_attempts = args.retries.saturating_add(1);
    let conflicts = Arc::new(AtomicU64::new(0));

    info!(
        record = %id,
        writers = args.writers,
        max_attempts,
        "starting update contention"
    );

    let mut tasks = JoinSet::new();
    for i in 0..args.writers {
        let update = MovieUpdate {
            genres: vec![format!("genre-{i}")],
            ..MovieUpdate::default()
        };
        update.validate().context("writer update is invalid")?;

        let coordinator = Arc::clone(&coordinator);
        let conflicts = Arc::clone(&conflicts);
        tasks.spawn(async move {
            retry_on_conflict(max_attempts, || {
                let coordinator = Arc::clone(&coordinator);
                let conflicts = Arc::clone(&conflicts);
                let update = update.clone();
                async move {
                    let timer = UpdateTimer::start();
                    let outcome = coordinator
                        .apply_with_timeout(id, move |movie| update.apply_to(movie))
                        .await;
                    let label = outcome.as_ref().map_or_else(UpdateError::as_str, |_| "success");
                    timer.finish(label);
                    if let Err(err @ UpdateError::Conflict { .. }) = &outcome {
                        conflicts.fetch_add(1, Ordering::Relaxed);
                        debug!(writer = i, error = %err, "update conflicted");
                    }
                    outcome
                }
            })
            .await
        });
    }

    let mut successes = 0;
    let mut gave_up = 0;
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.context("writer task failed")? {
            Ok(_) => successes += 1,
            Err(UpdateError::Conflict { .. }) => gave_up += 1,
            Err(err) => {
                warn!(error = %err, ambiguous = err.is_ambiguous(), "update failed");
                failed += 1;
            }
        }
    }

    let Some(current) = store.get(id).await.context("failed to read final record")? else {
        bail!("record {id} disappeared during contention");
    };

    let report = ContendReport {
        generated_at: Utc::now(),
        record_id: id,
        writers: args.writers,
        max_attempts,
        successes,
        conflicts: conflicts.load(Ordering::Relaxed),
        gave_up,
        failed,
        final_version: current.version,
        genres: current.payload.genres,
    };

    info!(
        successes = report.successes,
        conflicts = report.conflicts,
        final_version = report.final_version,
        "contention complete"
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => print_human(&report),
    }
    Ok(())
}

fn print_human(report: &ContendReport) {
    println!("Greenlight Update Contention");
    println!("============================");
    println!(
        "Record {}: {} writers, up to {} attempts each",
        report.record_id, report.writers, report.max_attempts
    );
    println!("Successes:      {}", report.successes);
    println!("Conflicts:      {}", report.conflicts);
    println!("Gave up:        {}", report.gave_up);
    println!("Failed:         {}", report.failed);
    println!("Final version:  {}", report.final_version);
    println!("Genres:         {}", report.genres.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_movie_is_valid() {
        assert!(seed_movie().validate().is_ok());
    }
}
