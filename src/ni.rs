//! Network interface: the injection and ejection endpoint of the fabric.
//!
//! The NI sits between a traffic generator and its attached router. On the
//! way in it admits flits against free output VCs and downstream credits,
//! holding a per-vnet packet-to-VC mapping so a wormhole packet's BODY and
//! TAIL follow the HEAD's VC. On the way out it consumes delivered flits,
//! returns credits, and hands the flits to the generator, which frees them.

use crate::buffer::{Timed, TimedBuffer};
use crate::event::{EventQueue, WakeTarget};
use crate::flit::{Credit, Flit};
use crate::link::{CreditLink, NetworkLink};
use crate::network::NetworkParams;
use crate::router::output_unit::OutVcState;
use crate::stats::NetworkStats;
use crate::traffic::TrafficGenerator;
use crate::types::{Cycle, LinkId, NiId, RouterId, VcId, VcState};

/// Fabric-to-NI side of one port pair.
#[derive(Debug)]
pub struct NiInputPort {
    pub in_link: LinkId,
    pub credit_link: LinkId,
    credit_queue: TimedBuffer<Credit>,
}

/// NI-to-fabric side of one port pair.
#[derive(Debug)]
pub struct NiOutputPort {
    pub out_link: LinkId,
    pub credit_link: LinkId,
    pub router: RouterId,
    out_queue: TimedBuffer<Flit>,
    vc_round_robin: VcId,
}

#[derive(Debug)]
pub struct NetworkInterface {
    pub id: NiId,
    pub x: usize,
    pub y: usize,
    pub z: usize,
    num_vnets: usize,
    vcs_per_vnet: usize,
    in_ports: Vec<NiInputPort>,
    out_ports: Vec<NiOutputPort>,
    /// Injection-side flit buffers, one per VC.
    out_vcs: Vec<TimedBuffer<Flit>>,
    /// Mirror of the router's input VC state, one per VC.
    out_vc_state: Vec<OutVcState>,
    /// Round-robin VC allocation pointer per vnet.
    vc_allocator: Vec<VcId>,
    /// VC carrying the in-flight packet of each vnet, if any.
    vnet_to_vc: Vec<Option<VcId>>,
    traffic: Box<dyn TrafficGenerator>,
    last_wakeup: Option<Cycle>,
}

impl NetworkInterface {
    pub fn new(
        id: NiId,
        x: usize,
        y: usize,
        z: usize,
        params: &NetworkParams,
        traffic: Box<dyn TrafficGenerator>,
    ) -> Self {
        let num_vcs = params.num_vcs();
        let mut out_vcs = Vec::with_capacity(num_vcs);
        let mut out_vc_state = Vec::with_capacity(num_vcs);
        for vc in 0..num_vcs {
            let vnet = vc / params.vcs_per_vnet;
            out_vcs.push(TimedBuffer::new());
            out_vc_state.push(OutVcState::new(params.buffers_for_vnet(vnet)));
        }
        Self {
            id,
            x,
            y,
            z,
            num_vnets: params.num_vnets,
            vcs_per_vnet: params.vcs_per_vnet,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
            out_vcs,
            out_vc_state,
            vc_allocator: vec![0; params.num_vnets],
            vnet_to_vc: vec![None; params.num_vnets],
            traffic,
            last_wakeup: None,
        }
    }

    /// Registers the router-to-NI link pair. Returns the port index.
    pub fn add_in_port(&mut self, in_link: LinkId, credit_link: LinkId) -> usize {
        self.in_ports.push(NiInputPort {
            in_link,
            credit_link,
            credit_queue: TimedBuffer::new(),
        });
        self.in_ports.len() - 1
    }

    /// Registers the NI-to-router link pair. Returns the port index.
    pub fn add_out_port(&mut self, out_link: LinkId, credit_link: LinkId, router: RouterId) -> usize {
        self.out_ports.push(NiOutputPort {
            out_link,
            credit_link,
            router,
            out_queue: TimedBuffer::new(),
            vc_round_robin: 0,
        });
        self.out_ports.len() - 1
    }

    /// The router this NI injects into.
    pub fn router_id(&self) -> RouterId {
        self.out_ports
            .first()
            .map(|p| p.router)
            .expect("NI has no outbound port wired")
    }

    /// Runs one NI cycle: eject, inject, absorb credits, drive the output
    /// link, and keep queued credits moving. Idempotent within a cycle.
    pub fn wakeup(
        &mut self,
        links: &mut [NetworkLink],
        credit_links: &mut [CreditLink],
        queue: &mut EventQueue,
        stats: &mut NetworkStats,
        _params: &NetworkParams,
    ) {
        let now = queue.now();
        if self.last_wakeup == Some(now) {
            return;
        }
        self.last_wakeup = Some(now);

        self.eject(links, queue, stats, now);

        if let Some(flit) = self.traffic.send_flit(now) {
            if let Err(stalled) = self.flit_inject(flit, now, stats) {
                self.traffic.requeue_flit(stalled);
            }
        }

        self.consume_credits(credit_links, now);
        self.schedule_output_link(queue, now);

        for port in &self.in_ports {
            if !port.credit_queue.is_empty() {
                queue.schedule(WakeTarget::CreditLink(port.credit_link), 1);
            }
        }
    }

    /// Consumes one delivered flit, returns its credit, and passes it to
    /// the traffic generator.
    fn eject(
        &mut self,
        links: &mut [NetworkLink],
        queue: &mut EventQueue,
        stats: &mut NetworkStats,
        now: Cycle,
    ) {
        for i in 0..self.in_ports.len() {
            if !links[self.in_ports[i].in_link].is_ready(now) {
                continue;
            }
            let mut flit = links[self.in_ports[i].in_link]
                .consume()
                .expect("ready link must yield a flit");
            flit.dequeue_time = now;

            self.in_ports[i]
                .credit_queue
                .insert(Credit::new(flit.vc, flit.kind.is_tail(), now));
            queue.schedule(WakeTarget::CreditLink(self.in_ports[i].credit_link), 1);

            let network_latency = now - flit.enqueue_time;
            let queueing_latency = flit.src_delay;
            stats.record_flit_received(flit.vnet, network_latency, queueing_latency);
            if flit.kind.is_tail() {
                stats.record_packet_received(
                    flit.vnet,
                    network_latency,
                    queueing_latency,
                    u64::from(flit.route.hops_traversed),
                );
            }

            if flit.trace {
                tracing::info!(ni = self.id, latency = network_latency, "ejected {flit}");
            } else {
                tracing::debug!(ni = self.id, "ejected {flit}");
            }

            self.traffic.receive_flit(flit, now);
            return;
        }
    }

    /// Admits one flit from the generator into an output VC.
    ///
    /// Returns the flit on a stall (no free VC for a new packet) so the
    /// caller can hand it back to the generator.
    fn flit_inject(
        &mut self,
        mut flit: Flit,
        now: Cycle,
        stats: &mut NetworkStats,
    ) -> Result<(), Flit> {
        let vnet = flit.vnet;

        let vc = if flit.kind.is_head() {
            assert!(
                self.vnet_to_vc[vnet].is_none(),
                "NI {}: HEAD flit while vnet {} is mid-packet",
                self.id,
                vnet
            );
            match self.calculate_vc(vnet, now) {
                Some(vc) => vc,
                None => {
                    tracing::debug!(ni = self.id, vnet, "stall: no free VC for {flit}");
                    return Err(flit);
                }
            }
        } else {
            self.vnet_to_vc[vnet]
                .expect("BODY/TAIL flit injected without a preceding HEAD")
        };

        if flit.kind.is_head() {
            self.vnet_to_vc[vnet] = Some(vc);
            self.out_vc_state[vc].set_state(VcState::Active, now);
            stats.record_packet_injected(vnet);
        }
        if flit.kind.is_tail() {
            self.vnet_to_vc[vnet] = None;
        }

        flit.vc = vc;
        stats.record_flit_injected(vnet);
        tracing::debug!(ni = self.id, vc, "injected {flit}");
        self.out_vcs[vc].insert(flit);
        Ok(())
    }

    /// Round-robin scan for an idle output VC in `vnet`.
    fn calculate_vc(&mut self, vnet: usize, now: Cycle) -> Option<VcId> {
        for _ in 0..self.vcs_per_vnet {
            let delta = self.vc_allocator[vnet];
            self.vc_allocator[vnet] = (delta + 1) % self.vcs_per_vnet;
            let vc = vnet * self.vcs_per_vnet + delta;
            if self.out_vc_state[vc].is_in_state(VcState::Idle, now) {
                return Some(vc);
            }
        }
        None
    }

    /// Absorbs credits arriving from the router.
    fn consume_credits(&mut self, credit_links: &mut [CreditLink], now: Cycle) {
        for i in 0..self.out_ports.len() {
            if !credit_links[self.out_ports[i].credit_link].is_ready(now) {
                continue;
            }
            let credit = credit_links[self.out_ports[i].credit_link]
                .consume()
                .expect("ready credit link must yield a credit");
            self.out_vc_state[credit.vc].increment_credit();
            if credit.is_free_signal {
                self.out_vc_state[credit.vc].set_state(VcState::Idle, now);
            }
        }
    }

    /// Moves at most one flit per outport onto the link, round-robin over
    /// VCs, respecting downstream credits.
    fn schedule_output_link(&mut self, queue: &mut EventQueue, now: Cycle) {
        let Self {
            out_ports,
            out_vcs,
            out_vc_state,
            ..
        } = self;

        for port in out_ports.iter_mut() {
            let num_vcs = out_vcs.len();
            let mut vc = port.vc_round_robin;
            for _ in 0..num_vcs {
                vc = (vc + 1) % num_vcs;
                if out_vcs[vc].is_ready(now) && out_vc_state[vc].has_credit() {
                    port.vc_round_robin = vc;
                    out_vc_state[vc].decrement_credit();

                    let mut flit = out_vcs[vc].pop().expect("ready buffer must pop");
                    flit.set_time(now + 1);
                    port.out_queue.insert(flit);
                    queue.schedule(WakeTarget::Link(port.out_link), 1);
                    break;
                }
            }
        }
    }

    pub fn traffic(&self) -> &dyn TrafficGenerator {
        self.traffic.as_ref()
    }

    pub(crate) fn outport_queue_mut(&mut self, port: usize) -> &mut TimedBuffer<Flit> {
        &mut self.out_ports[port].out_queue
    }

    pub(crate) fn inport_credit_queue_mut(&mut self, port: usize) -> &mut TimedBuffer<Credit> {
        &mut self.in_ports[port].credit_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::flit::{NetDest, RouteInfo};
    use crate::types::FlitType;

    #[derive(Debug)]
    struct SilentTraffic;

    impl TrafficGenerator for SilentTraffic {
        fn send_flit(&mut self, _now: Cycle) -> Option<Flit> {
            None
        }
        fn requeue_flit(&mut self, _flit: Flit) {}
        fn receive_flit(&mut self, _flit: Flit, _now: Cycle) {}
    }

    fn make_ni() -> NetworkInterface {
        let params = NetworkParams::from_config(&SimConfig::default());
        let mut ni = NetworkInterface::new(0, 0, 0, 0, &params, Box::new(SilentTraffic));
        ni.add_out_port(0, 0, 0);
        ni.add_in_port(1, 1);
        ni
    }

    fn packet_flit(kind: FlitType, vnet: usize, now: Cycle) -> Flit {
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
        Flit::new(0, 0, 0, vnet, route, 1, kind, 16, now)
    }

    #[test]
    fn test_head_allocates_vc_and_tail_clears_mapping() {
        let mut ni = make_ni();
        let mut stats = NetworkStats::new(2);

        ni.flit_inject(packet_flit(FlitType::Head, 1, 0), 0, &mut stats)
            .unwrap();
        assert!(ni.vnet_to_vc[1].is_some());

        ni.flit_inject(packet_flit(FlitType::Tail, 1, 0), 0, &mut stats)
            .unwrap();
        assert!(ni.vnet_to_vc[1].is_none());

        assert_eq!(stats.injected_packets[1], 1);
        assert_eq!(stats.injected_flits[1], 2);
    }

    #[test]
    fn test_inject_stalls_when_all_vcs_busy() {
        let mut ni = make_ni();
        let mut stats = NetworkStats::new(2);

        // Fill all four VCs of vnet 1 with single-flit packets.
        for _ in 0..4 {
            ni.flit_inject(packet_flit(FlitType::HeadTail, 1, 0), 0, &mut stats)
                .unwrap();
        }

        let result = ni.flit_inject(packet_flit(FlitType::HeadTail, 1, 0), 0, &mut stats);
        assert!(result.is_err());
        assert_eq!(stats.injected_packets[1], 4);
    }

    #[test]
    fn test_vc_allocation_round_robins() {
        let mut ni = make_ni();
        let mut stats = NetworkStats::new(2);

        ni.flit_inject(packet_flit(FlitType::HeadTail, 1, 0), 0, &mut stats)
            .unwrap();
        ni.flit_inject(packet_flit(FlitType::HeadTail, 1, 0), 0, &mut stats)
            .unwrap();

        // vnet 1 owns VCs 4..8; consecutive packets take consecutive VCs.
        assert_eq!(ni.out_vcs[4].len(), 1);
        assert_eq!(ni.out_vcs[5].len(), 1);
    }

    #[test]
    fn test_output_link_respects_credits() {
        let mut ni = make_ni();
        let mut stats = NetworkStats::new(2);
        let mut queue = EventQueue::new();

        ni.flit_inject(packet_flit(FlitType::HeadTail, 1, 0), 0, &mut stats)
            .unwrap();

        // Drain the credits of the VC that was just claimed.
        let vc = ni.vnet_to_vc[1];
        assert!(vc.is_none(), "single-flit packet clears the mapping");
        while ni.out_vc_state[4].has_credit() {
            ni.out_vc_state[4].decrement_credit();
        }

        ni.schedule_output_link(&mut queue, 0);
        assert_eq!(ni.out_vcs[4].len(), 1, "flit must stall without credit");

        ni.out_vc_state[4].increment_credit();
        ni.schedule_output_link(&mut queue, 0);
        assert!(ni.out_vcs[4].is_empty());
        assert_eq!(ni.out_ports[0].out_queue.len(), 1);
    }
}
