//! Load tests: random traffic on a mesh and saturation of a single flow.

use nocsim::config::{SimConfig, TrafficPattern};
use nocsim::topology;

#[test]
fn uniform_random_traffic_on_a_2x2_mesh() {
    let mut config = SimConfig::default();
    config.rows = 2;
    config.cols = 2;
    config.cycles = 1000;
    config.injection_rate = 0.5;
    config.packet_size = 1;
    config.seed = 42;

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();

    // Four NIs injecting at 0.5 packets per cycle for 1000 cycles.
    assert!(
        (1800..=2200).contains(&report.packets_injected),
        "injected {} packets at rate 0.5",
        report.packets_injected
    );

    // Everything injected is received except what is still in flight.
    assert!(report.packets_received <= report.packets_injected);
    assert!(
        report.packets_received + 60 >= report.packets_injected,
        "received {} of {} injected",
        report.packets_received,
        report.packets_injected
    );

    // The mesh is far from saturation at this load.
    assert!(
        report.average_network_latency < 20.0,
        "latency {} under moderate load",
        report.average_network_latency
    );

    assert!(report.average_link_utilization > 0.0);
    assert!(report.average_link_utilization <= 1.0);
}

#[test]
fn saturated_flow_is_limited_by_link_bandwidth() {
    // NI 0 drives NI 3 across a 1x4 mesh at rate 1.0. Delivery is bounded
    // by one flit per cycle on each link; credit-counter sanity is
    // assertion-checked inside the output units as the run progresses.
    let mut config = SimConfig::default();
    config.rows = 1;
    config.cols = 4;
    config.cycles = 1000;
    config.injection_rate = 1.0;
    config.packet_size = 1;
    config.pattern = TrafficPattern::SingleFlow { src: 0, dest: 3 };

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();

    assert!(report.packets_received <= 1001);
    assert!(
        report.packets_received >= 900,
        "delivered {} packets over 1000 cycles at saturation",
        report.packets_received
    );

    // Every delivered packet crossed all four routers.
    assert_eq!(report.average_hops, 4.0);
}

#[test]
fn deterministic_runs_reproduce_with_the_same_seed() {
    let mut config = SimConfig::default();
    config.rows = 2;
    config.cols = 2;
    config.cycles = 500;
    config.injection_rate = 0.3;
    config.seed = 7;

    let run = |config: &SimConfig| {
        let mut network = topology::build(config).unwrap();
        network.init().unwrap();
        network.run(config.cycles);
        network.report()
    };

    let first = run(&config);
    let second = run(&config);
    assert_eq!(first.packets_injected, second.packets_injected);
    assert_eq!(first.packets_received, second.packets_received);
    assert_eq!(first.average_network_latency, second.average_network_latency);

    config.seed = 8;
    let third = run(&config);
    assert_ne!(
        (
            first.packets_injected,
            first.packets_received,
            first.average_network_latency.to_bits()
        ),
        (
            third.packets_injected,
            third.packets_received,
            third.average_network_latency.to_bits()
        ),
        "different seeds should produce different traffic"
    );
}

#[test]
fn multi_flit_packets_under_load_are_never_torn() {
    let mut config = SimConfig::default();
    config.rows = 2;
    config.cols = 2;
    config.cycles = 2000;
    config.injection_rate = 0.1;
    config.packet_size = 4;
    config.seed = 3;

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();

    assert!(report.packets_received > 0);
    // Received flit count matches packet count times packet size, modulo
    // packets caught mid-delivery at the horizon: at most one partial
    // packet per VC per NI, each short of its TAIL.
    let max_partial_flits = 4 * 8 * 3;
    assert!(report.flits_received >= report.packets_received * 4);
    assert!(report.flits_received <= report.packets_received * 4 + max_partial_flits);
}
