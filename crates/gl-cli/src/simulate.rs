//! `greenlight simulate`: concurrent clients against the admission gate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Args;
use gl_ratelimit::{AdmissionGate, ClientLimiterRegistry, Decision};
use gl_telemetry::metrics;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of distinct client keys.
    #[arg(long, default_value = "8")]
    clients: usize,

    /// Requests sent by each client.
    #[arg(long, default_value = "10")]
    requests: u32,

    /// Pause between one client's requests, in milliseconds.
    #[arg(long, default_value = "0")]
    spacing_ms: u64,

    /// Output format: json (machine-readable) or human (pretty-printed).
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
struct Tally {
    admitted: u64,
    rejected_global: u64,
    rejected_client: u64,
}

impl Tally {
    fn add(&mut self, decision: Decision) {
        match decision {
            Decision::Admitted => self.admitted += 1,
            Decision::RejectedGlobal => self.rejected_global += 1,
            Decision::RejectedPerClient => self.rejected_client += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.admitted += other.admitted;
        self.rejected_global += other.rejected_global;
        self.rejected_client += other.rejected_client;
    }
}

#[derive(Debug, Serialize)]
struct SimulateReport {
    generated_at: DateTime<Utc>,
    clients: usize,
    requests_per_client: u32,
    spacing_ms: u64,
    #[serde(flatten)]
    tally: Tally,
    tracked_clients: usize,
    buckets_created: u64,
}

pub async fn run(config: &ServiceConfig, args: SimulateArgs) -> anyhow::Result<()> {
    if args.clients == 0 {
        bail!("--clients must be at least 1");
    }

    let registry = Arc::new(
        ClientLimiterRegistry::new(config.admission.client.clone())
            .context("invalid client limiter config")?,
    );
    let sweeper = registry.start_sweeper();
    let gate = Arc::new(AdmissionGate::new(
        &config.admission.global,
        Arc::clone(&registry),
    ));

    info!(
        clients = args.clients,
        requests = args.requests,
        spacing_ms = args.spacing_ms,
        "starting admission simulation"
    );

    let spacing = Duration::from_millis(args.spacing_ms);
    let mut tasks = JoinSet::new();
    for i in 0..args.clients {
        let gate = Arc::clone(&gate);
        let requests = args.requests;
        tasks.spawn(async move {
            let key = format!("client-{i}");
            let mut tally = Tally::default();
            for n in 0..requests {
                if n > 0 && !spacing.is_zero() {
                    tokio::time::sleep(spacing).await;
                }
                let decision = gate.check(&key);
                metrics::record_admission(decision.as_str());
                tally.add(decision);
            }
            debug!(client = %key, admitted = tally.admitted, "client finished");
            tally
        });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        tally.merge(joined.context("client task failed")?);
    }

    sweeper.stop().await.context("limiter sweeper failed")?;
    metrics::set_limiter_clients(registry.len());
    metrics::record_evictions(registry.evicted_total());

    let report = SimulateReport {
        generated_at: Utc::now(),
        clients: args.clients,
        requests_per_client: args.requests,
        spacing_ms: args.spacing_ms,
        tally,
        tracked_clients: registry.len(),
        buckets_created: registry.created_total(),
    };

    info!(
        admitted = report.tally.admitted,
        rejected_global = report.tally.rejected_global,
        rejected_client = report.tally.rejected_client,
        "simulation complete"
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => print_human(&report),
    }
    Ok(())
}

fn print_human(report: &SimulateReport) {
    println!("Greenlight Admission Simulation");
    println!("===============================");
    println!(
        "Clients: {} x {} requests (spacing {}ms)",
        report.clients, report.requests_per_client, report.spacing_ms
    );
    println!("Admitted:            {}", report.tally.admitted);
    println!("Rejected (global):   {}", report.tally.rejected_global);
    println!("Rejected (client):   {}", report.tally.rejected_client);
    println!("Tracked clients:     {}", report.tracked_clients);
}
