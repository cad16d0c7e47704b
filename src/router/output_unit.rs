//! Output-port state: downstream VC tracking and the outbound queue.
//!
//! One output unit per router output port. It mirrors the state of the
//! input VCs at the downstream node: a credit counter per VC bounded by the
//! downstream buffer depth, and an idle/active bit used for VC allocation.
//! Credits arrive over the port's incoming credit link; flits leave through
//! the outbound queue drained by the output link.

use crate::buffer::TimedBuffer;
use crate::event::{EventQueue, WakeTarget};
use crate::flit::Flit;
use crate::link::CreditLink;
use crate::network::NetworkParams;
use crate::types::{Cycle, Direction, LinkId, VcId, VcState};

/// Mirror of one downstream input VC.
#[derive(Debug)]
pub struct OutVcState {
    state: VcState,
    state_time: Cycle,
    credits: u32,
    max_credits: u32,
}

impl OutVcState {
    pub fn new(max_credits: u32) -> Self {
        Self {
            state: VcState::Idle,
            state_time: 0,
            credits: max_credits,
            max_credits,
        }
    }

    /// True if the VC has been in `state` since no later than `now`.
    pub fn is_in_state(&self, state: VcState, now: Cycle) -> bool {
        self.state == state && self.state_time <= now
    }

    pub fn set_state(&mut self, state: VcState, now: Cycle) {
        self.state = state;
        self.state_time = now;
    }

    pub fn has_credit(&self) -> bool {
        self.credits > 0
    }

    pub fn credits(&self) -> u32 {
        self.credits
    }

    pub fn increment_credit(&mut self) {
        self.credits += 1;
        assert!(
            self.credits <= self.max_credits,
            "credit counter exceeded downstream buffer depth ({})",
            self.max_credits
        );
    }

    pub fn decrement_credit(&mut self) {
        assert!(self.credits > 0, "credit counter underflow");
        self.credits -= 1;
    }
}

/// One router output port.
#[derive(Debug)]
pub struct OutputUnit {
    pub id: usize,
    pub direction: Direction,
    pub out_link: LinkId,
    pub credit_link: LinkId,
    out_buffer: TimedBuffer<Flit>,
    vc_states: Vec<OutVcState>,
    /// Round-robin pointer per vnet for VC allocation.
    vc_round_robin: Vec<VcId>,
    vcs_per_vnet: usize,
}

impl OutputUnit {
    pub fn new(
        id: usize,
        direction: Direction,
        out_link: LinkId,
        credit_link: LinkId,
        params: &NetworkParams,
    ) -> Self {
        let num_vcs = params.num_vcs();
        let mut vc_states = Vec::with_capacity(num_vcs);
        for vc in 0..num_vcs {
            let vnet = vc / params.vcs_per_vnet;
            vc_states.push(OutVcState::new(params.buffers_for_vnet(vnet)));
        }
        Self {
            id,
            direction,
            out_link,
            credit_link,
            out_buffer: TimedBuffer::new(),
            vc_states,
            vc_round_robin: vec![0; params.num_vnets],
            vcs_per_vnet: params.vcs_per_vnet,
        }
    }

    /// Absorbs one credit from the downstream node, if one has arrived.
    pub fn wakeup(&mut self, credit_links: &mut [CreditLink], queue: &EventQueue) {
        let now = queue.now();
        if credit_links[self.credit_link].is_ready(now) {
            let credit = credit_links[self.credit_link]
                .consume()
                .expect("ready credit link must yield a credit");
            self.vc_states[credit.vc].increment_credit();
            if credit.is_free_signal {
                self.vc_states[credit.vc].set_state(VcState::Idle, now);
            }
        }
    }

    pub fn has_credit(&self, vc: VcId) -> bool {
        self.vc_states[vc].has_credit()
    }

    pub fn decrement_credit(&mut self, vc: VcId) {
        self.vc_states[vc].decrement_credit();
    }

    pub fn credits(&self, vc: VcId) -> u32 {
        self.vc_states[vc].credits()
    }

    /// True if some VC of `vnet` is free for a new packet.
    pub fn has_free_vc(&self, vnet: usize, now: Cycle) -> bool {
        self.vnet_range(vnet)
            .any(|vc| self.vc_states[vc].is_in_state(VcState::Idle, now))
    }

    /// Claims a free VC of `vnet`, scanning round-robin from the vnet's
    /// pointer. The chosen VC becomes active.
    pub fn select_free_vc(&mut self, vnet: usize, now: Cycle) -> Option<VcId> {
        let base = vnet * self.vcs_per_vnet;
        let start = self.vc_round_robin[vnet];
        for i in 0..self.vcs_per_vnet {
            let offset = (start + i) % self.vcs_per_vnet;
            let vc = base + offset;
            if self.vc_states[vc].is_in_state(VcState::Idle, now) {
                self.vc_states[vc].set_state(VcState::Active, now);
                self.vc_round_robin[vnet] = (offset + 1) % self.vcs_per_vnet;
                return Some(vc);
            }
        }
        None
    }

    /// Queues a flit for the output link and schedules the link.
    pub fn insert(&mut self, flit: Flit, queue: &mut EventQueue) {
        self.out_buffer.insert(flit);
        queue.schedule(WakeTarget::Link(self.out_link), 1);
    }

    pub(crate) fn out_buffer_mut(&mut self) -> &mut TimedBuffer<Flit> {
        &mut self.out_buffer
    }

    fn vnet_range(&self, vnet: usize) -> std::ops::Range<VcId> {
        vnet * self.vcs_per_vnet..(vnet + 1) * self.vcs_per_vnet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn params() -> NetworkParams {
        NetworkParams::from_config(&SimConfig::default())
    }

    fn unit() -> OutputUnit {
        OutputUnit::new(0, Direction::East, 0, 0, &params())
    }

    #[test]
    fn test_credits_start_at_buffer_depth() {
        let ou = unit();
        // vnet 0 is the control class with shallow buffers.
        assert_eq!(ou.credits(0), 1);
        // vnet 1 is a data class.
        assert_eq!(ou.credits(4), 4);
    }

    #[test]
    fn test_credit_counter_bounds() {
        let mut ou = unit();
        assert!(ou.has_credit(4));
        ou.decrement_credit(4);
        ou.decrement_credit(4);
        assert_eq!(ou.credits(4), 2);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_credit_underflow_is_fatal() {
        let mut ou = unit();
        ou.decrement_credit(0);
        ou.decrement_credit(0);
    }

    #[test]
    #[should_panic(expected = "exceeded")]
    fn test_credit_overflow_is_fatal() {
        let mut ou = unit();
        ou.vc_states[0].increment_credit();
    }

    #[test]
    fn test_select_free_vc_round_robin() {
        let mut ou = unit();

        // vnet 1 owns VCs 4..8; allocation walks them in order.
        assert_eq!(ou.select_free_vc(1, 0), Some(4));
        assert_eq!(ou.select_free_vc(1, 0), Some(5));
        assert_eq!(ou.select_free_vc(1, 0), Some(6));
        assert_eq!(ou.select_free_vc(1, 0), Some(7));
        assert!(!ou.has_free_vc(1, 0));
        assert_eq!(ou.select_free_vc(1, 0), None);

        // Releasing one VC makes it allocatable again.
        ou.vc_states[5].set_state(VcState::Idle, 1);
        assert!(ou.has_free_vc(1, 1));
        assert_eq!(ou.select_free_vc(1, 1), Some(5));
    }

    #[test]
    fn test_out_vc_state_time_gating() {
        let mut state = OutVcState::new(4);
        state.set_state(VcState::Idle, 5);
        assert!(!state.is_in_state(VcState::Idle, 4));
        assert!(state.is_in_state(VcState::Idle, 5));
    }
}
