//! # nocsim
//!
//! A cycle-accurate, discrete-event simulator for on-chip interconnection
//! networks with virtual-channel wormhole routing.
//!
//! Given a topology of routers, links, and network interfaces plus a
//! synthetic workload, the simulator reproduces the per-cycle behavior of
//! a packet-switched fabric: injection, per-VC buffering, route
//! computation, two-stage switch allocation, crossbar traversal,
//! credit-based backpressure, and ejection. Output is cycle-resolved
//! traffic statistics.
//!
//! ## Design
//!
//! - **Flat arena**: the [`network::Network`] owns every router, NI, and
//!   link in plain vectors; components reference each other by index, and
//!   flits and credits move by value through owned queues.
//! - **Two-phase driver**: each cycle first wakes every NI and router
//!   once, then drains all events due at that cycle. Event targets are a
//!   small tagged variant, not trait objects.
//! - **Single timeline**: one executor, no locks; a "cycle" is the
//!   quantum at which the driver advances the event queue.
//!
//! ## Example
//!
//! ```
//! use nocsim::config::SimConfig;
//! use nocsim::topology;
//!
//! let mut config = SimConfig::default();
//! config.rows = 2;
//! config.cols = 2;
//! config.test_mode = true;
//!
//! let mut network = topology::build(&config).unwrap();
//! network.init().unwrap();
//! network.run(100);
//!
//! let report = network.report();
//! assert_eq!(report.packets_received, 1);
//! ```

pub mod buffer;
pub mod config;
pub mod event;
pub mod fault;
pub mod flit;
pub mod link;
pub mod network;
pub mod ni;
pub mod router;
pub mod stats;
pub mod topology;
pub mod traffic;
pub mod types;

pub use config::{ConfigError, RoutingAlgorithm, SimConfig, TrafficPattern};
pub use network::Network;
pub use stats::{NetworkStats, StatsReport};
pub use types::{Cycle, LinkId, NiId, RouterId, VcId};
