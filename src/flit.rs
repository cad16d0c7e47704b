//! Value types moved through the fabric: flits, credits, and routes.
//!
//! A flit is the unit of transport; a credit is the backpressure signal
//! flowing the opposite way; `RouteInfo` is the routing context a packet
//! carries from injection to ejection. None of them hold payload data, the
//! simulator models timing only.

use crate::buffer::Timed;
use crate::types::{Cycle, FlitStage, FlitType, NiId, RouterId, VcId};

/// Destination set of a packet, a bitset over NI ids.
///
/// Routing tables store one of these per (vnet, outport); route lookup
/// intersects the packet's set against the table entries a word at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetDest {
    words: Vec<u64>,
}

impl NetDest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one NI to the set.
    pub fn add(&mut self, ni: NiId) {
        let word = ni / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (ni % 64);
    }

    pub fn contains(&self, ni: NiId) -> bool {
        self.words
            .get(ni / 64)
            .map(|w| w & (1 << (ni % 64)) != 0)
            .unwrap_or(false)
    }

    /// True if the two sets share at least one destination.
    pub fn intersects(&self, other: &NetDest) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

/// Routing context shared by all flits of one packet.
///
/// Set once at injection; only `hops_traversed` changes afterwards, bumped
/// by every router input unit that consumes a flit of the packet.
#[derive(Clone, Debug)]
pub struct RouteInfo {
    pub src_ni: NiId,
    pub dest_ni: NiId,
    pub src_router: RouterId,
    pub dest_router: RouterId,
    pub vnet: usize,
    pub net_dest: NetDest,
    pub hops_traversed: u32,
}

/// A flow-control digit, the smallest unit the fabric moves.
#[derive(Clone, Debug)]
pub struct Flit {
    /// Globally unique packet identifier.
    pub packet_id: u64,
    /// Index of this flit within its packet.
    pub id: usize,
    /// Virtual channel on the current link.
    pub vc: VcId,
    /// Virtual network; constant for the packet's lifetime.
    pub vnet: usize,
    pub route: RouteInfo,
    /// Packet length in flits.
    pub size: usize,
    pub kind: FlitType,
    /// Output port chosen by switch allocation at the current router.
    pub outport: Option<usize>,
    stage: FlitStage,
    stage_time: Cycle,
    /// Cycle at which the flit becomes visible to the next consumer.
    time: Cycle,
    pub creation_time: Cycle,
    pub enqueue_time: Cycle,
    pub dequeue_time: Cycle,
    /// Cycles spent queued at the source before entering the network.
    pub src_delay: Cycle,
    /// Physical width in bits; carried for link statistics.
    pub width: u32,
    /// Marks the flit for per-packet trace logging.
    pub trace: bool,
}

impl Flit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        packet_id: u64,
        id: usize,
        vc: VcId,
        vnet: usize,
        route: RouteInfo,
        size: usize,
        kind: FlitType,
        width: u32,
        now: Cycle,
    ) -> Self {
        Self {
            packet_id,
            id,
            vc,
            vnet,
            route,
            size,
            kind,
            outport: None,
            stage: FlitStage::SwitchAllocation,
            stage_time: now,
            time: now,
            creation_time: now,
            enqueue_time: now,
            dequeue_time: now,
            src_delay: 0,
            width,
            trace: false,
        }
    }

    /// True if the flit sits in `stage` and the stage is valid at `now`.
    pub fn is_stage(&self, stage: FlitStage, now: Cycle) -> bool {
        self.stage == stage && now >= self.stage_time
    }

    /// Moves the flit to `stage`, valid from `time` onward.
    pub fn advance_stage(&mut self, stage: FlitStage, time: Cycle) {
        self.stage = stage;
        self.stage_time = time;
    }

    pub fn stage(&self) -> (FlitStage, Cycle) {
        (self.stage, self.stage_time)
    }
}

impl Timed for Flit {
    fn time(&self) -> Cycle {
        self.time
    }

    fn set_time(&mut self, time: Cycle) {
        self.time = time;
    }

    fn vc(&self) -> VcId {
        self.vc
    }
}

impl std::fmt::Display for Flit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "flit {}.{} ({:?}, vnet {}, vc {}, {} -> {})",
            self.packet_id, self.id, self.kind, self.vnet, self.vc, self.route.src_ni, self.route.dest_ni
        )
    }
}

/// One freed buffer slot, signalled upstream.
///
/// `is_free_signal` additionally releases the whole VC: it is set when the
/// granted flit was the packet's last.
#[derive(Clone, Copy, Debug)]
pub struct Credit {
    pub vc: VcId,
    pub is_free_signal: bool,
    time: Cycle,
}

impl Credit {
    pub fn new(vc: VcId, is_free_signal: bool, now: Cycle) -> Self {
        Self {
            vc,
            is_free_signal,
            time: now,
        }
    }
}

impl Timed for Credit {
    fn time(&self) -> Cycle {
        self.time
    }

    fn set_time(&mut self, time: Cycle) {
        self.time = time;
    }

    fn vc(&self) -> VcId {
        self.vc
    }
}
