//! End-to-end simulation pipeline

use crate::config::Scenario;
use crate::context::{Network, SimulationContext};
use crate::report::{ContactReport, NodeSummary, RunInfo, SimulationResult};
use crate::Result;
use bundle_routing::{BundleGenerator, NetworkState, Scheduler, SimulationStats};
use contact_graph::{ContactGraph, ContactPlanBuilder, NodeKind, SimulationClock};
use tracing::info;

/// Propagate, build contacts, generate traffic and route it to the horizon
pub fn run(scenario: &Scenario) -> Result<SimulationResult> {
    scenario.validate()?;
    let sim = &scenario.simulation;

    let network = Network::from_scenario(scenario)?;
    let clock = SimulationClock::new(sim.step_size, sim.duration)?;
    let plan = ContactPlanBuilder::new(network.epoch_jd()).build(network.nodes(), &clock)?;
    let graph = ContactGraph::new(network.nodes(), &plan)?;

    let generator = BundleGenerator::new(scenario.bundles.profile(), sim.seed)?
        .with_downlink_capacity(graph.stats().downlink_capacity_bytes);
    let bundles = generator.generate(
        &network.ids_of(NodeKind::Target),
        sim.duration,
        sim.step_size,
    );
    info!(bundles = bundles.len(), seed = sim.seed, "Traffic generated");

    let state = NetworkState::new(network.nodes(), &graph, bundles)?;
    let scheduler = Scheduler::new(&graph, scenario.scheduler_config());
    let mut context = SimulationContext::new(clock, state);
    context.run(&scheduler)?;

    let (records, events, ledger) = context.into_state().into_parts();
    let stats = SimulationStats::collect(&records, &events, &ledger, graph.windows());

    info!(
        generated = stats.generated,
        delivered = stats.delivered,
        expired = stats.expired,
        dropped = stats.dropped,
        forwarded = stats.forwarded,
        rerouted = stats.rerouted,
        "Simulation finished, delivery ratio {:.3}",
        stats.delivery_ratio
    );

    Ok(SimulationResult {
        run: RunInfo::new(network.epoch_jd(), sim.duration, sim.step_size, sim.seed),
        nodes: network.nodes().iter().map(NodeSummary::from).collect(),
        graph: graph.stats(),
        contacts: graph.windows().to_vec(),
        bundles: records,
        transmissions: events,
        stats,
    })
}

/// Contact plan only, no bundle traffic
pub fn run_contacts(scenario: &Scenario) -> Result<ContactReport> {
    scenario.validate()?;
    let sim = &scenario.simulation;

    let network = Network::from_scenario(scenario)?;
    let clock = SimulationClock::new(sim.step_size, sim.duration)?;
    let plan = ContactPlanBuilder::new(network.epoch_jd()).build(network.nodes(), &clock)?;
    let graph = ContactGraph::new(network.nodes(), &plan)?;

    Ok(ContactReport {
        run: RunInfo::new(network.epoch_jd(), sim.duration, sim.step_size, sim.seed),
        nodes: network.nodes().iter().map(NodeSummary::from).collect(),
        graph: graph.stats(),
        contacts: plan.into_windows(),
    })
}
