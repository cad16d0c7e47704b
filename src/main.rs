//! Command-line entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nocsim::config::{RoutingAlgorithm, SimConfig, TrafficPattern};
use nocsim::fault::{BASELINE_TEMPERATURE, FAULT_TYPE_NAMES};
use nocsim::topology;

/// Cycle-accurate simulator for virtual-channel wormhole NoCs.
#[derive(Parser, Debug)]
#[command(name = "nocsim", version, about)]
struct Cli {
    /// Built-in topology name (Mesh_XY) or path to a .conf file.
    #[arg(long, short = 'T')]
    topology: Option<String>,

    /// Mesh rows.
    #[arg(long, short = 'r')]
    rows: Option<usize>,

    /// Mesh columns.
    #[arg(long, short = 'c')]
    cols: Option<usize>,

    /// Mesh layers (3D mesh when greater than 1).
    #[arg(long, short = 'z')]
    depth: Option<usize>,

    /// Cycles to simulate.
    #[arg(long, short = 'n')]
    cycles: Option<u64>,

    /// Packets per NI per cycle, in [0, 1].
    #[arg(long, short = 'i')]
    rate: Option<f64>,

    /// Packet length in flits.
    #[arg(long, short = 'p')]
    packet_size: Option<usize>,

    /// Routing algorithm: 0 = table, 1 = XY.
    #[arg(long, short = 'a', value_parser = parse_routing)]
    routing: Option<RoutingAlgorithm>,

    /// Deterministic single-packet test (NI 0 to the last NI).
    #[arg(long, short = 't')]
    test_mode: bool,

    /// Verbose per-component logging.
    #[arg(long, short = 'd')]
    debug: bool,

    /// Log the lifetime of every generated packet.
    #[arg(long, short = 'x')]
    trace_packet: bool,

    /// Enable the router fault model and print per-router fault data.
    #[arg(long, short = 'f')]
    fault_model: bool,

    /// Seed for the synthetic workload.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Router pipeline depth in cycles.
    #[arg(long)]
    router_latency: Option<u64>,

    /// Direct all traffic from one NI to another: "<src>:<dest>".
    #[arg(long, value_parser = parse_flow)]
    single_flow: Option<(usize, usize)>,

    /// Load a YAML configuration file first; flags override it.
    #[arg(long)]
    config: Option<String>,

    /// Print statistics as JSON instead of a text summary.
    #[arg(long)]
    json: bool,
}

fn parse_routing(value: &str) -> Result<RoutingAlgorithm, String> {
    let raw: u8 = value
        .parse()
        .map_err(|_| format!("routing must be numeric, got {value}"))?;
    RoutingAlgorithm::try_from(raw)
}

fn parse_flow(value: &str) -> Result<(usize, usize), String> {
    let (src, dest) = value
        .split_once(':')
        .ok_or_else(|| "expected <src>:<dest>".to_string())?;
    let src = src.parse().map_err(|_| format!("bad source NI: {src}"))?;
    let dest = dest.parse().map_err(|_| format!("bad destination NI: {dest}"))?;
    Ok((src, dest))
}

impl Cli {
    fn into_config(self) -> Result<SimConfig, nocsim::ConfigError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_yaml_file(path)?,
            None => SimConfig::default(),
        };

        if let Some(topology) = self.topology {
            config.topology = topology;
        }
        if let Some(rows) = self.rows {
            config.rows = rows;
        }
        if let Some(cols) = self.cols {
            config.cols = cols;
        }
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        if let Some(rate) = self.rate {
            config.injection_rate = rate;
        }
        if let Some(packet_size) = self.packet_size {
            config.packet_size = packet_size;
        }
        if let Some(routing) = self.routing {
            config.routing = routing;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(latency) = self.router_latency {
            config.router_latency = latency;
        }
        if let Some((src, dest)) = self.single_flow {
            config.pattern = TrafficPattern::SingleFlow { src, dest };
        }
        config.test_mode |= self.test_mode;
        config.debug |= self.debug;
        config.trace_packet |= self.trace_packet;
        config.fault_model |= self.fault_model;

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "nocsim=debug" } else { "nocsim=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;
    let debug = cli.debug;

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(debug);

    let mut network = match topology::build(&config) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = network.init() {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(fault_model) = network.fault_model() {
        print_fault_data(fault_model, network.num_routers());
    }

    tracing::info!(
        topology = %config.topology,
        cycles = config.cycles,
        rate = config.injection_rate,
        "starting simulation"
    );
    network.run(config.cycles);

    let report = network.report();
    if json {
        match report.to_json() {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else if report.write_summary(std::io::stdout()).is_err() {
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn print_fault_data(fault_model: &nocsim::fault::FaultModel, num_routers: usize) {
    for router in 0..num_routers {
        let (vector, _) = fault_model.fault_vector(router, BASELINE_TEMPERATURE);
        println!("Router-{router} fault vector:");
        for (name, probability) in FAULT_TYPE_NAMES.iter().zip(vector.iter()) {
            println!(" - probability of ({name}) = {probability}");
        }
        let (aggregate, _) = fault_model.fault_prob(router, BASELINE_TEMPERATURE);
        println!("Router-{router} fault probability: {aggregate}");
    }
}
