//! DTN Constellation Simulator CLI
//!
//! Usage:
//!   dtn-sim --scenario scenarios/polar_relay.json --output results.json
//!   dtn-sim --scenario scenarios/polar_relay.json --output contacts.json --contacts-only

use anyhow::{Context, Result};
use clap::Parser;
use dtn_simulator::{engine, loader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "dtn-sim",
    about = "Simulate a satellite constellation as a delay-tolerant network"
)]
struct Args {
    /// Scenario JSON file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Output JSON file
    #[arg(short, long, default_value = "results.json")]
    output: PathBuf,

    /// Stop after the contact plan and write it instead of a full run
    #[arg(long)]
    contacts_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "dtn_simulator=debug,contact_graph=debug,bundle_routing=debug"
    } else {
        "dtn_simulator=info,contact_graph=info,bundle_routing=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("{}", "=".repeat(60));
    info!("DTN Constellation Simulator");
    info!("{}", "=".repeat(60));

    let scenario = loader::load_scenario(&args.scenario)
        .with_context(|| format!("loading scenario {:?}", args.scenario))?;

    if args.contacts_only {
        let report = engine::run_contacts(&scenario)?;
        report.write_json(&args.output)?;

        info!("{}", "=".repeat(60));
        info!("Contact windows: {}", report.graph.windows);
        info!("  inter-satellite: {}", report.graph.isl_windows);
        info!("  satellite-ground: {}", report.graph.ground_windows);
        info!("Total capacity: {:.0} bytes", report.graph.total_capacity_bytes);
        return Ok(());
    }

    let result = engine::run(&scenario)?;
    result.write_json(&args.output)?;

    let stats = &result.stats;
    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Contact windows: {}", result.graph.windows);
    info!("Bundles generated: {}", stats.generated);
    info!("  delivered: {}", stats.delivered);
    info!("  expired: {}", stats.expired);
    info!(
        "  dropped: {} (no route {}, storage {}, horizon {})",
        stats.dropped, stats.drops.no_route, stats.drops.storage_overflow, stats.drops.horizon_end
    );
    info!("Hop transmissions: {}", stats.forwarded);
    info!("Re-routes: {}", stats.rerouted);
    info!("Delivery ratio: {:.3}", stats.delivery_ratio);
    if let (Some(mean), Some(stddev)) = (stats.latency.mean, stats.latency.stddev) {
        info!("Latency: mean {:.1} s, stddev {:.1} s", mean, stddev);
    }

    Ok(())
}
