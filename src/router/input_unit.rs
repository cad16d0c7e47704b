//! Input-port state: virtual channels and the credit return path.
//!
//! One input unit per router input port. It consumes arriving flits from
//! the incoming link, runs route computation for HEAD flits, buffers flits
//! per VC, and sends credits back upstream when the switch allocator drains
//! a flit out of a VC.

use crate::buffer::TimedBuffer;
use crate::event::{EventQueue, WakeTarget};
use crate::flit::{Credit, Flit};
use crate::link::NetworkLink;
use crate::network::NetworkParams;
use crate::router::routing::RoutingUnit;
use crate::router::RouterInfo;
use crate::types::{Cycle, Direction, FlitStage, LinkId, VcId, VcState};

/// Per-VC state on the input side of a router.
///
/// While `Active`, exactly one packet flows through the VC; the outport is
/// latched at route computation and the output VC at switch allocation, so
/// BODY and TAIL flits inherit both without re-arbitration.
#[derive(Debug)]
pub struct VirtualChannel {
    state: VcState,
    buffer: TimedBuffer<Flit>,
    output_port: Option<usize>,
    output_vc: Option<VcId>,
}

impl Default for VirtualChannel {
    fn default() -> Self {
        Self {
            state: VcState::Idle,
            buffer: TimedBuffer::new(),
            output_port: None,
            output_vc: None,
        }
    }
}

impl VirtualChannel {
    pub fn state(&self) -> VcState {
        self.state
    }

    pub fn set_active(&mut self) {
        self.state = VcState::Active;
    }

    /// Returns the VC to idle and clears the packet bindings.
    pub fn set_idle(&mut self) {
        self.state = VcState::Idle;
        self.output_port = None;
        self.output_vc = None;
    }

    pub fn insert_flit(&mut self, flit: Flit) {
        self.buffer.insert(flit);
    }

    pub fn peek_top_flit(&self) -> Option<&Flit> {
        self.buffer.peek()
    }

    pub fn get_top_flit(&mut self) -> Option<Flit> {
        self.buffer.pop()
    }

    /// True if the top flit sits in `stage`, valid at `now`.
    pub fn need_stage(&self, stage: FlitStage, now: Cycle) -> bool {
        self.buffer
            .peek()
            .map(|f| f.is_stage(stage, now))
            .unwrap_or(false)
    }

    pub fn set_outport(&mut self, outport: usize) {
        self.output_port = Some(outport);
    }

    pub fn outport(&self) -> Option<usize> {
        self.output_port
    }

    /// Latches the downstream VC chosen at switch allocation.
    pub fn grant_outvc(&mut self, outvc: VcId) {
        self.output_vc = Some(outvc);
    }

    pub fn outvc(&self) -> Option<VcId> {
        self.output_vc
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// One router input port: its VCs, incoming link, and credit return queue.
#[derive(Debug)]
pub struct InputUnit {
    pub id: usize,
    pub direction: Direction,
    pub in_link: LinkId,
    pub credit_link: LinkId,
    vcs: Vec<VirtualChannel>,
    credit_queue: TimedBuffer<Credit>,
}

impl InputUnit {
    pub fn new(
        id: usize,
        direction: Direction,
        num_vcs: usize,
        in_link: LinkId,
        credit_link: LinkId,
    ) -> Self {
        let mut vcs = Vec::with_capacity(num_vcs);
        for _ in 0..num_vcs {
            vcs.push(VirtualChannel::default());
        }
        Self {
            id,
            direction,
            in_link,
            credit_link,
            vcs,
            credit_queue: TimedBuffer::new(),
        }
    }

    /// Reads one flit from the incoming link, if one has arrived.
    ///
    /// HEAD and HEAD_TAIL flits claim their VC and trigger route
    /// computation; BODY and TAIL flits reuse the latched outport. The
    /// flit becomes eligible for switch allocation after the router's
    /// pipeline delay.
    pub fn wakeup(
        &mut self,
        info: RouterInfo,
        routing: &RoutingUnit,
        links: &mut [NetworkLink],
        queue: &mut EventQueue,
        params: &NetworkParams,
    ) {
        let now = queue.now();
        if !links[self.in_link].is_ready(now) {
            return;
        }

        let mut flit = links[self.in_link]
            .consume()
            .expect("ready link must yield a flit");
        flit.route.hops_traversed += 1;
        let vc = flit.vc;

        if flit.kind.is_head() {
            assert_eq!(
                self.vcs[vc].state(),
                VcState::Idle,
                "router {} inport {}: HEAD flit arrived on busy VC {}",
                info.id,
                self.id,
                vc
            );
            self.vcs[vc].set_active();

            // All flits of this packet will leave through this outport.
            let outport = routing.outport_compute(&flit.route, info, params);
            self.vcs[vc].set_outport(outport);
        } else {
            assert_eq!(
                self.vcs[vc].state(),
                VcState::Active,
                "router {} inport {}: {:?} flit arrived on idle VC {}",
                info.id,
                self.id,
                flit.kind,
                vc
            );
        }

        if flit.trace {
            tracing::info!(
                router = info.id,
                inport = %self.direction,
                vc,
                "received {flit}"
            );
        } else {
            tracing::debug!(router = info.id, inport = %self.direction, vc, "received {flit}");
        }

        if info.pipe_stages == 1 {
            flit.advance_stage(FlitStage::SwitchAllocation, now);
        } else {
            // Deeper pipelines hold the flit in the buffer before it may
            // compete for the switch.
            let wait = info.pipe_stages - 1;
            flit.advance_stage(FlitStage::SwitchAllocation, now + wait);
            queue.schedule(WakeTarget::Router(info.id), wait);
        }

        self.vcs[vc].insert_flit(flit);

        // Another flit may already be waiting behind this one.
        if links[self.in_link].is_ready(now) {
            queue.schedule(WakeTarget::Router(info.id), 1);
        }
    }

    /// Queues a credit for the upstream node and schedules the credit link.
    ///
    /// Called by the switch allocator when a flit in `vc` wins the switch;
    /// `free_signal` releases the whole VC when the winner was the
    /// packet's last flit.
    pub fn increment_credit(
        &mut self,
        vc: VcId,
        free_signal: bool,
        now: Cycle,
        queue: &mut EventQueue,
    ) {
        self.credit_queue.insert(Credit::new(vc, free_signal, now));
        queue.schedule(WakeTarget::CreditLink(self.credit_link), 1);
    }

    pub fn vc(&self, vc: VcId) -> &VirtualChannel {
        &self.vcs[vc]
    }

    pub fn vc_mut(&mut self, vc: VcId) -> &mut VirtualChannel {
        &mut self.vcs[vc]
    }

    pub fn num_vcs(&self) -> usize {
        self.vcs.len()
    }

    pub fn has_pending_flits(&self) -> bool {
        self.vcs.iter().any(|vc| !vc.is_empty())
    }

    pub(crate) fn credit_queue_mut(&mut self) -> &mut TimedBuffer<Credit> {
        &mut self.credit_queue
    }
}
