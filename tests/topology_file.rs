//! End-to-end runs over file-defined topologies.

use std::path::PathBuf;

use nocsim::config::{RoutingAlgorithm, SimConfig};
use nocsim::topology;

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("nocsim-it-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Two routers in a line, fully described by a file, table routing only.
const PAIR_CONF: &str = "\
# 1x2 line
NumRouters 2
0 0 0 0
1 1 0 0

NumNIs 2
0 0 0 0
1 1 0 0

ExtLinks
0 0
1 1

IntLinks
0 1 1 1 East West
1 0 1 1 West East

RoutingTables
0 0 0
0 1 1
1 1 0
1 0 1
";

#[test]
fn packet_crosses_a_file_topology_with_table_routing() {
    let path = write_temp("pair.conf", PAIR_CONF);

    let mut config = SimConfig::default();
    config.topology = path.display().to_string();
    config.routing = RoutingAlgorithm::Table;
    config.test_mode = true;
    config.cycles = 100;

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();
    std::fs::remove_file(&path).ok();

    assert_eq!(report.packets_injected, 1);
    assert_eq!(report.packets_received, 1);
    assert_eq!(report.average_hops, 2.0);
}

#[test]
fn link_weights_steer_table_routing() {
    // Router 0 reaches NI 1 both directly (weight 3) and through router 2
    // (weight 1 each way); the table must pick the cheap first hop.
    let conf = "\
NumRouters 3
0 0 0 0
1 1 0 0
2 0 1 0

NumNIs 2
0 0 0 0
1 1 0 0

ExtLinks
0 0
1 1

IntLinks
0 1 1 3 East West
0 2 1 1 South North
2 1 1 1 East South
1 0 1 1 West East

RoutingTables
0 0 0
0 1 2
0 1 1
2 1 0
1 1 0
1 0 1
";
    let path = write_temp("weighted.conf", conf);

    let mut config = SimConfig::default();
    config.topology = path.display().to_string();
    config.routing = RoutingAlgorithm::Table;
    config.test_mode = true;
    config.cycles = 100;

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();
    std::fs::remove_file(&path).ok();

    assert_eq!(report.packets_received, 1);
    // The detour through router 2 touches three routers, not two.
    assert_eq!(report.average_hops, 3.0);
}

#[test]
fn custom_port_labels_are_accepted() {
    let conf = "\
NumRouters 2
0 0 0 0
1 1 0 0

NumNIs 2
0 0 0 0
1 1 0 0

ExtLinks
0 0
1 1

IntLinks
0 1 1 1 RingCw RingCcw
1 0 1 1 RingCcw RingCw

RoutingTables
0 0 0
0 1 1
1 1 0
1 0 1
";
    let path = write_temp("ring.conf", conf);

    let mut config = SimConfig::default();
    config.topology = path.display().to_string();
    config.routing = RoutingAlgorithm::Table;
    config.test_mode = true;
    config.cycles = 100;

    let mut network = topology::build(&config).unwrap();
    network.init().unwrap();
    network.run(config.cycles);
    let report = network.report();
    std::fs::remove_file(&path).ok();

    assert_eq!(report.packets_received, 1);
}

#[test]
fn unknown_topology_name_fails_before_simulation() {
    let mut config = SimConfig::default();
    config.topology = "Butterfly".to_string();
    assert!(topology::build(&config).is_err());
}

#[test]
fn truncated_file_fails_cleanly() {
    let path = write_temp("broken.conf", "NumRouters 4\n0 0 0 0\n");
    let mut config = SimConfig::default();
    config.topology = path.display().to_string();

    // Only one of four router rows is present; the parser must reject the
    // file rather than build a partial network.
    let result = topology::build(&config);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}
