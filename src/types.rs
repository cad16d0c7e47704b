//! Core type definitions for the simulator.
//!
//! This module defines the fundamental identifiers and small shared enums
//! used throughout the fabric model.

use serde::{Deserialize, Serialize};

/// Simulation time in cycles.
///
/// Every timestamp in the simulator (event times, flit readiness, credit
/// arrival) is an absolute cycle count on one shared timeline.
pub type Cycle = u64;

/// Index of a router in the network arena.
pub type RouterId = usize;

/// Index of a network interface in the network arena.
pub type NiId = usize;

/// Index of a link (flit link or credit link) in the network arena.
pub type LinkId = usize;

/// Index of a virtual channel within one port.
///
/// VCs are numbered `vnet * vcs_per_vnet + k`, so the virtual network of a
/// VC is recoverable by integer division.
pub type VcId = usize;

/// State of a virtual channel.
///
/// An input VC is `Active` from the arrival of a HEAD flit until its TAIL
/// drains; an output-side VC slot is `Active` while the downstream input VC
/// is reserved for a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VcState {
    Idle,
    Active,
}

/// Position of a flit within its packet.
///
/// A packet is `Head [Body...] Tail`, or a lone `HeadTail` when it fits in
/// one flit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlitType {
    Head,
    Body,
    Tail,
    HeadTail,
}

impl FlitType {
    /// True for flits that open a packet and trigger route computation.
    pub fn is_head(self) -> bool {
        matches!(self, FlitType::Head | FlitType::HeadTail)
    }

    /// True for flits that close a packet and release the VC.
    pub fn is_tail(self) -> bool {
        matches!(self, FlitType::Tail | FlitType::HeadTail)
    }
}

/// Router pipeline stage a flit is waiting in.
///
/// Each flit carries a `(stage, valid_from)` pair; a stage is reached only
/// once the current cycle is at or past `valid_from`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlitStage {
    /// Eligible for switch allocation.
    SwitchAllocation,
    /// Won the switch, waiting in a crossbar buffer.
    SwitchTraversal,
    /// Traversing the output link.
    LinkTraversal,
}

/// Message class of a virtual network.
///
/// Control vnets carry short packets and get shallow buffers; data vnets
/// get the full buffer depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VnetType {
    Ctrl,
    Data,
}

/// Port direction on a router.
///
/// The six compass directions plus `Local` cover mesh topologies; topology
/// files may use arbitrary port labels, which are interned into `Named`
/// indices by the topology parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Local,
    North,
    South,
    East,
    West,
    Up,
    Down,
    Named(u16),
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Local => write!(f, "Local"),
            Direction::North => write!(f, "North"),
            Direction::South => write!(f, "South"),
            Direction::East => write!(f, "East"),
            Direction::West => write!(f, "West"),
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
            Direction::Named(i) => write!(f, "Named({i})"),
        }
    }
}
