//! Two-stage separable switch allocation.
//!
//! Runs once per router per cycle, after the input and output units.
//! Stage one picks at most one candidate VC per input port; stage two picks
//! at most one winning input per output port. Both stages scan round-robin
//! from per-port pointers that advance past a winner only on a full grant,
//! so every eligible requester is served within a bounded number of cycles.
//!
//! A full grant moves the flit to the crossbar, charges a downstream
//! credit, and returns a credit upstream; for HEAD flits it also allocates
//! the downstream VC and latches it into the input VC so the rest of the
//! packet inherits it.

use crate::event::EventQueue;
use crate::router::crossbar::CrossbarSwitch;
use crate::router::input_unit::InputUnit;
use crate::router::output_unit::OutputUnit;
use crate::router::RouterInfo;
use crate::types::{Cycle, FlitStage, VcId};

#[derive(Debug)]
pub struct SwitchAllocator {
    /// Per-inport pointer into that port's VCs.
    round_robin_invc: Vec<VcId>,
    /// Per-outport pointer over input ports.
    round_robin_inport: Vec<usize>,
    /// Stage-one result: requested outport per inport, cleared each cycle.
    port_requests: Vec<Option<usize>>,
    /// Stage-one result: winning VC per inport.
    vc_winners: Vec<VcId>,
    input_arbiter_activity: u64,
    output_arbiter_activity: u64,
}

impl Default for SwitchAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchAllocator {
    pub fn new() -> Self {
        Self {
            round_robin_invc: Vec::new(),
            round_robin_inport: Vec::new(),
            port_requests: Vec::new(),
            vc_winners: Vec::new(),
            input_arbiter_activity: 0,
            output_arbiter_activity: 0,
        }
    }

    /// Sizes the arbiter state once all ports exist.
    pub fn init(&mut self, num_inports: usize, num_outports: usize) {
        self.round_robin_invc = vec![0; num_inports];
        self.round_robin_inport = vec![0; num_outports];
        self.port_requests = vec![None; num_inports];
        self.vc_winners = vec![0; num_inports];
    }

    pub fn wakeup(
        &mut self,
        info: RouterInfo,
        input_units: &mut [InputUnit],
        output_units: &mut [OutputUnit],
        crossbar: &mut CrossbarSwitch,
        queue: &mut EventQueue,
    ) {
        let now = queue.now();
        self.arbitrate_inports(input_units, output_units, now);
        self.arbitrate_outports(info, input_units, output_units, crossbar, queue, now);
    }

    /// Stage one: per input port, pick one SA-eligible VC whose request
    /// could actually be sent (free downstream VC for a HEAD, a credit
    /// otherwise).
    fn arbitrate_inports(
        &mut self,
        input_units: &[InputUnit],
        output_units: &[OutputUnit],
        now: Cycle,
    ) {
        for (inport, iu) in input_units.iter().enumerate() {
            self.port_requests[inport] = None;

            let num_vcs = iu.num_vcs();
            let start = self.round_robin_invc[inport];
            for i in 0..num_vcs {
                let invc = (start + i) % num_vcs;
                if !iu.vc(invc).need_stage(FlitStage::SwitchAllocation, now) {
                    continue;
                }

                let outport = iu
                    .vc(invc)
                    .outport()
                    .expect("SA-eligible VC must have a computed outport");
                let outvc = iu.vc(invc).outvc();
                let vnet = iu
                    .vc(invc)
                    .peek_top_flit()
                    .expect("SA-eligible VC must hold a flit")
                    .vnet;

                if Self::send_allowed(&output_units[outport], outvc, vnet, now) {
                    self.input_arbiter_activity += 1;
                    self.port_requests[inport] = Some(outport);
                    self.vc_winners[inport] = invc;
                    break;
                }
            }
        }
    }

    /// A request is sendable if the target output VC exists and has buffer
    /// space. A VC is bound at HEAD grant, so an unbound request means a
    /// HEAD flit asking for VC allocation.
    fn send_allowed(
        output_unit: &OutputUnit,
        outvc: Option<VcId>,
        vnet: usize,
        now: Cycle,
    ) -> bool {
        match outvc {
            Some(vc) => output_unit.has_credit(vc),
            None => output_unit.has_free_vc(vnet, now),
        }
    }

    /// Stage two: per output port, grant one requesting input.
    fn arbitrate_outports(
        &mut self,
        info: RouterInfo,
        input_units: &mut [InputUnit],
        output_units: &mut [OutputUnit],
        crossbar: &mut CrossbarSwitch,
        queue: &mut EventQueue,
        now: Cycle,
    ) {
        let num_inports = input_units.len();
        for outport in 0..output_units.len() {
            let start = self.round_robin_inport[outport];
            for i in 0..num_inports {
                let inport = (start + i) % num_inports;
                if self.port_requests[inport] != Some(outport) {
                    continue;
                }

                let invc = self.vc_winners[inport];
                self.grant(
                    info, input_units, output_units, crossbar, queue, now, inport, invc, outport,
                );

                self.round_robin_inport[outport] = (inport + 1) % num_inports;
                self.round_robin_invc[inport] =
                    (invc + 1) % input_units[inport].num_vcs();
                self.port_requests[inport] = None;
                self.output_arbiter_activity += 1;
                break;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn grant(
        &mut self,
        info: RouterInfo,
        input_units: &mut [InputUnit],
        output_units: &mut [OutputUnit],
        crossbar: &mut CrossbarSwitch,
        queue: &mut EventQueue,
        now: Cycle,
        inport: usize,
        invc: VcId,
        outport: usize,
    ) {
        // HEAD flits allocate their downstream VC here; the binding is
        // latched so BODY and TAIL inherit it.
        let outvc = match input_units[inport].vc(invc).outvc() {
            Some(vc) => vc,
            None => {
                let vnet = input_units[inport]
                    .vc(invc)
                    .peek_top_flit()
                    .expect("granted VC must hold a flit")
                    .vnet;
                let vc = output_units[outport]
                    .select_free_vc(vnet, now)
                    .expect("stage one guaranteed a free downstream VC");
                input_units[inport].vc_mut(invc).grant_outvc(vc);
                vc
            }
        };

        let mut flit = input_units[inport]
            .vc_mut(invc)
            .get_top_flit()
            .expect("granted VC must hold a flit");

        flit.outport = Some(outport);
        flit.vc = outvc;
        flit.advance_stage(FlitStage::SwitchTraversal, now);
        output_units[outport].decrement_credit(outvc);

        let free_signal = flit.kind.is_tail();
        if free_signal {
            input_units[inport].vc_mut(invc).set_idle();
        }

        tracing::trace!(
            router = info.id,
            inport,
            invc,
            outport,
            outvc,
            "switch granted to {flit}"
        );

        crossbar.update_sw_winner(inport, flit);
        input_units[inport].increment_credit(invc, free_signal, now, queue);
    }

    pub fn input_arbiter_activity(&self) -> u64 {
        self.input_arbiter_activity
    }

    pub fn output_arbiter_activity(&self) -> u64 {
        self.output_arbiter_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::flit::{Flit, NetDest, RouteInfo};
    use crate::network::NetworkParams;
    use crate::types::{Direction, FlitType};

    fn params() -> NetworkParams {
        NetworkParams::from_config(&SimConfig::default())
    }

    fn info() -> RouterInfo {
        RouterInfo {
            id: 0,
            x: 0,
            y: 0,
            z: 0,
            pipe_stages: 1,
            num_vnets: 2,
            vcs_per_vnet: 4,
            num_vcs: 8,
        }
    }

    fn head_tail_flit(vnet: usize, vc: VcId, now: Cycle) -> Flit {
        let mut net_dest = NetDest::new();
        net_dest.add(1);
        let route = RouteInfo {
            src_ni: 0,
            dest_ni: 1,
            src_router: 0,
            dest_router: 1,
            vnet,
            net_dest,
            hops_traversed: 0,
        };
        let mut f = Flit::new(0, 0, vc, vnet, route, 1, FlitType::HeadTail, 16, now);
        f.advance_stage(FlitStage::SwitchAllocation, now);
        f
    }

    fn harness(num_inports: usize, num_outports: usize) -> (SwitchAllocator, Vec<InputUnit>, Vec<OutputUnit>, CrossbarSwitch) {
        let p = params();
        let mut alloc = SwitchAllocator::new();
        alloc.init(num_inports, num_outports);

        let input_units = (0..num_inports)
            .map(|i| InputUnit::new(i, Direction::Local, p.num_vcs(), 0, 0))
            .collect::<Vec<_>>();
        let output_units = (0..num_outports)
            .map(|i| OutputUnit::new(i, Direction::East, 0, 0, &p))
            .collect::<Vec<_>>();

        let mut crossbar = CrossbarSwitch::new();
        crossbar.init(num_inports);

        (alloc, input_units, output_units, crossbar)
    }

    fn load_vc(iu: &mut InputUnit, vc: VcId, vnet: usize, outport: usize, now: Cycle) {
        iu.vc_mut(vc).set_active();
        iu.vc_mut(vc).set_outport(outport);
        iu.vc_mut(vc).insert_flit(head_tail_flit(vnet, vc, now));
    }

    #[test]
    fn test_single_flit_wins_and_frees_vc() {
        let (mut alloc, mut ius, mut ous, mut xbar) = harness(1, 1);
        let mut queue = EventQueue::new();

        load_vc(&mut ius[0], 4, 1, 0, 0);
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);

        // The winner moved to the crossbar and released its input VC.
        assert!(ius[0].vc(4).is_empty());
        assert_eq!(ius[0].vc(4).state(), crate::types::VcState::Idle);
        assert_eq!(alloc.output_arbiter_activity(), 1);

        // A downstream VC of vnet 1 was claimed and charged one credit.
        assert_eq!(ous[0].credits(4), 3);

        // The freeing credit is on its way upstream.
        let credit = ius[0].credit_queue_mut().pop().unwrap();
        assert_eq!(credit.vc, 4);
        assert!(credit.is_free_signal);
    }

    #[test]
    fn test_two_inputs_one_output_single_grant_per_cycle() {
        let (mut alloc, mut ius, mut ous, mut xbar) = harness(2, 1);
        let mut queue = EventQueue::new();

        load_vc(&mut ius[0], 4, 1, 0, 0);
        load_vc(&mut ius[1], 4, 1, 0, 0);
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);

        // Only one of the two competing inputs may win the output.
        let drained = [&ius[0], &ius[1]]
            .iter()
            .filter(|iu| iu.vc(4).is_empty())
            .count();
        assert_eq!(drained, 1);
        assert_eq!(alloc.output_arbiter_activity(), 1);
    }

    #[test]
    fn test_round_robin_alternates_between_inputs() {
        let (mut alloc, mut ius, mut ous, mut xbar) = harness(2, 1);
        let mut queue = EventQueue::new();

        load_vc(&mut ius[0], 4, 1, 0, 0);
        load_vc(&mut ius[1], 4, 1, 0, 0);
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);
        let first_winner = if ius[0].vc(4).is_empty() { 0 } else { 1 };

        // Reload both and arbitrate again: the loser must win now.
        queue.advance_to(1);
        load_vc(&mut ius[first_winner], 5, 1, 0, 1);
        let loser = 1 - first_winner;
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);
        assert!(ius[loser].vc(4).is_empty());
    }

    #[test]
    fn test_no_grant_without_credits() {
        let (mut alloc, mut ius, mut ous, mut xbar) = harness(1, 1);
        let mut queue = EventQueue::new();

        // Exhaust all four data VCs downstream, then request a fifth packet.
        for _ in 0..4 {
            let vc = ous[0].select_free_vc(1, 0).unwrap();
            while ous[0].has_credit(vc) {
                ous[0].decrement_credit(vc);
            }
        }
        load_vc(&mut ius[0], 4, 1, 0, 0);
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);

        // The flit stalls in place and stays SA-eligible.
        assert!(!ius[0].vc(4).is_empty());
        assert!(ius[0].vc(4).need_stage(FlitStage::SwitchAllocation, 0));
        assert_eq!(alloc.output_arbiter_activity(), 0);
    }

    #[test]
    fn test_body_inherits_outvc_without_reallocation() {
        let (mut alloc, mut ius, mut ous, mut xbar) = harness(1, 1);
        let mut queue = EventQueue::new();

        // A three-flit packet: HEAD goes first.
        let mut head = head_tail_flit(1, 4, 0);
        head.kind = FlitType::Head;
        head.size = 3;
        ius[0].vc_mut(4).set_active();
        ius[0].vc_mut(4).set_outport(0);
        ius[0].vc_mut(4).insert_flit(head);

        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);
        let bound = ius[0].vc(4).outvc().expect("HEAD grant binds the outvc");
        assert_eq!(ius[0].vc(4).state(), crate::types::VcState::Active);

        // BODY reuses the binding; no second VC is allocated.
        queue.advance_to(1);
        let mut body = head_tail_flit(1, 4, 1);
        body.kind = FlitType::Body;
        body.size = 3;
        body.id = 1;
        ius[0].vc_mut(4).insert_flit(body);
        alloc.wakeup(info(), &mut ius, &mut ous, &mut xbar, &mut queue);

        assert_eq!(ius[0].vc(4).outvc(), Some(bound));
        assert_eq!(ous[0].credits(bound), 2);
    }
}
