//! Bundle accounting checked step by step

use bundle_routing::{
    BundleGenerator, BundleState, NetworkState, Scheduler, StoragePolicy, ValueSpec,
};
use contact_graph::{ContactGraph, ContactPlanBuilder, NodeKind, SimulationClock};
use dtn_simulator::{engine, loader, Network, Scenario};
use proptest::prelude::*;
use std::path::PathBuf;

fn constrained_scenario() -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/polar_relay.json");
    let mut s = loader::load_scenario(path).unwrap();
    s.simulation.duration = 21_600.0;
    s.bundles.size = ValueSpec::Range([500, 3000]);
    s.bundles.lifetime = ValueSpec::Range([1800.0, 7200.0]);
    s.satellites.storage = 6000;
    s.satellites.storage_policy = StoragePolicy::Drop;
    s
}

#[test]
fn test_ledger_balanced_every_step() {
    let s = constrained_scenario();
    s.validate().unwrap();
    let sim = &s.simulation;

    let network = Network::from_scenario(&s).unwrap();
    let clock = SimulationClock::new(sim.step_size, sim.duration).unwrap();
    let plan = ContactPlanBuilder::new(network.epoch_jd())
        .build(network.nodes(), &clock)
        .unwrap();
    let graph = ContactGraph::new(network.nodes(), &plan).unwrap();
    let bundles = BundleGenerator::new(s.bundles.profile(), sim.seed)
        .unwrap()
        .with_downlink_capacity(graph.stats().downlink_capacity_bytes)
        .generate(&network.ids_of(NodeKind::Target), sim.duration, sim.step_size);
    let total = bundles.len();

    let mut state = NetworkState::new(network.nodes(), &graph, bundles).unwrap();
    let scheduler = Scheduler::new(&graph, s.scheduler_config());

    for t in clock.sample_times() {
        scheduler.step(&mut state, t).unwrap();

        let counts = state.counts();
        assert!(counts.is_balanced(), "unbalanced at t = {t}: {counts:?}");
        assert_eq!(counts.generated + counts.pending, total);
        state.check_ownership().unwrap();

        for (node, queue) in state.queues() {
            if let Some(capacity) = queue.capacity_bytes() {
                assert!(queue.used_bytes() <= capacity, "{node} over capacity at t = {t}");
            }
        }
    }

    scheduler.finish(&mut state, sim.duration).unwrap();
    let counts = state.counts();
    assert!(counts.is_balanced());
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.queued + counts.in_transit, 0);
    assert!(state.records().iter().all(|r| r.state.is_terminal()));
    assert!(state.queues().all(|(_, q)| q.is_empty() && q.reserved_bytes() == 0));
}

#[test]
fn test_blocking_policy_never_drops_for_storage() {
    let mut s = constrained_scenario();
    s.satellites.storage_policy = StoragePolicy::Block;
    let result = engine::run(&s).unwrap();
    assert_eq!(result.stats.drops.storage_overflow, 0);
    assert_eq!(
        result.stats.delivered + result.stats.expired + result.stats.dropped,
        result.stats.generated
    );
}

#[test]
fn test_expiry_never_precedes_lifetime() {
    let result = engine::run(&constrained_scenario()).unwrap();
    for record in &result.bundles {
        match record.state {
            BundleState::Expired { at } => assert!(at >= record.bundle.expires_at()),
            BundleState::Delivered { at, .. } => assert!(
                at <= record.bundle.expires_at(),
                "{} delivered at {at} after expiry {}",
                record.bundle.id,
                record.bundle.expires_at()
            ),
            _ => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    #[test]
    fn test_any_seed_conserves_bundles(seed in any::<u64>()) {
        let mut s = constrained_scenario();
        s.simulation.seed = seed;
        s.simulation.duration = 7200.0;

        let result = engine::run(&s).unwrap();
        let stats = &result.stats;
        prop_assert_eq!(stats.delivered + stats.expired + stats.dropped, stats.generated);
        prop_assert!(result.bundles.iter().all(|r| r.state.is_terminal()));
        for w in &stats.windows {
            prop_assert!(w.transmitted_bytes as f64 <= w.capacity_bytes + 1e-6);
        }
    }
}
