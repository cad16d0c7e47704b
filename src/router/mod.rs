//! The router: input units, output units, routing, allocation, crossbar.
//!
//! A router wakes at most once per cycle and runs its pipeline in a fixed
//! order: input units consume arrivals, output units absorb credits, the
//! switch allocator arbitrates, and the crossbar moves the winners. All
//! cross-component references are arena indices carried by the links; the
//! router itself owns only its ports and arbiter state.

pub mod allocator;
pub mod crossbar;
pub mod input_unit;
pub mod output_unit;
pub mod routing;

use crate::event::{EventQueue, WakeTarget};
use crate::flit::NetDest;
use crate::link::{CreditLink, NetworkLink};
use crate::network::NetworkParams;
use crate::types::{Cycle, Direction, LinkId, RouterId};

use allocator::SwitchAllocator;
use crossbar::CrossbarSwitch;
use input_unit::InputUnit;
use output_unit::OutputUnit;
use routing::RoutingUnit;

/// Immutable per-router facts handed down to the pipeline components.
#[derive(Clone, Copy, Debug)]
pub struct RouterInfo {
    pub id: RouterId,
    pub x: usize,
    pub y: usize,
    pub z: usize,
    /// Pipeline depth: cycles from flit arrival to SA eligibility.
    pub pipe_stages: Cycle,
    pub num_vnets: usize,
    pub vcs_per_vnet: usize,
    pub num_vcs: usize,
}

#[derive(Debug)]
pub struct Router {
    pub id: RouterId,
    pub x: usize,
    pub y: usize,
    pub z: usize,
    latency: Cycle,
    num_vnets: usize,
    vcs_per_vnet: usize,
    input_units: Vec<InputUnit>,
    output_units: Vec<OutputUnit>,
    routing: RoutingUnit,
    sw_alloc: SwitchAllocator,
    crossbar: CrossbarSwitch,
    last_wakeup: Option<Cycle>,
}

impl Router {
    pub fn new(id: RouterId, x: usize, y: usize, z: usize, params: &NetworkParams) -> Self {
        Self {
            id,
            x,
            y,
            z,
            latency: params.router_latency,
            num_vnets: params.num_vnets,
            vcs_per_vnet: params.vcs_per_vnet,
            input_units: Vec::new(),
            output_units: Vec::new(),
            routing: RoutingUnit::new(params.num_vnets),
            sw_alloc: SwitchAllocator::new(),
            crossbar: CrossbarSwitch::new(),
            last_wakeup: None,
        }
    }

    /// Registers an input port fed by `in_link`, returning credits through
    /// `credit_link`. Returns the new port index.
    pub fn add_in_port(
        &mut self,
        direction: Direction,
        in_link: LinkId,
        credit_link: LinkId,
    ) -> usize {
        let port = self.input_units.len();
        self.input_units.push(InputUnit::new(
            port,
            direction,
            self.num_vcs(),
            in_link,
            credit_link,
        ));
        self.routing.add_in_direction(direction, port);
        port
    }

    /// Registers an output port draining into `out_link`, with its routing
    /// table column and link weight. Returns the new port index.
    pub fn add_out_port(
        &mut self,
        direction: Direction,
        out_link: LinkId,
        routing_entry: Vec<NetDest>,
        link_weight: u32,
        credit_link: LinkId,
        params: &NetworkParams,
    ) -> usize {
        let port = self.output_units.len();
        self.output_units.push(OutputUnit::new(
            port,
            direction,
            out_link,
            credit_link,
            params,
        ));
        self.routing.add_route(routing_entry);
        self.routing.add_weight(link_weight);
        self.routing.add_out_direction(direction, port);
        port
    }

    /// Sizes the arbiter and crossbar; call once after all ports exist.
    pub fn init(&mut self) {
        self.sw_alloc
            .init(self.input_units.len(), self.output_units.len());
        self.crossbar.init(self.input_units.len());
    }

    /// Runs one cycle of the router pipeline.
    ///
    /// Idempotent within a cycle: link deliveries and pipeline-delay events
    /// may wake a router that the driver already ran this cycle, and a
    /// second pass must not arbitrate twice.
    pub fn wakeup(
        &mut self,
        links: &mut [NetworkLink],
        credit_links: &mut [CreditLink],
        queue: &mut EventQueue,
        params: &NetworkParams,
    ) {
        let now = queue.now();
        if self.last_wakeup == Some(now) {
            return;
        }
        self.last_wakeup = Some(now);

        let info = self.info();
        let Router {
            input_units,
            output_units,
            routing,
            sw_alloc,
            crossbar,
            ..
        } = self;

        for iu in input_units.iter_mut() {
            iu.wakeup(info, routing, links, queue, params);
        }
        for ou in output_units.iter_mut() {
            ou.wakeup(credit_links, queue);
        }
        sw_alloc.wakeup(info, input_units, output_units, crossbar, queue);
        crossbar.wakeup(output_units, queue);

        // Keep draining while any VC still holds buffered flits.
        if input_units.iter().any(|iu| iu.has_pending_flits()) {
            queue.schedule(WakeTarget::Router(info.id), 1);
        }
    }

    pub fn info(&self) -> RouterInfo {
        RouterInfo {
            id: self.id,
            x: self.x,
            y: self.y,
            z: self.z,
            pipe_stages: self.latency,
            num_vnets: self.num_vnets,
            vcs_per_vnet: self.vcs_per_vnet,
            num_vcs: self.num_vcs(),
        }
    }

    pub fn num_vcs(&self) -> usize {
        self.num_vnets * self.vcs_per_vnet
    }

    pub fn num_inports(&self) -> usize {
        self.input_units.len()
    }

    pub fn num_outports(&self) -> usize {
        self.output_units.len()
    }

    pub fn outport_for_direction(&self, direction: Direction) -> Option<usize> {
        self.routing.outport_for_direction(direction)
    }

    /// Adds `dest_ni` to an outport's destination set (topology-file
    /// `RoutingTables` rows).
    pub fn add_route_for_port(&mut self, port: usize, dest_ni: usize) {
        self.routing.add_route_for_port(port, dest_ni);
    }

    pub fn input_unit(&self, port: usize) -> &InputUnit {
        &self.input_units[port]
    }

    pub fn output_unit(&self, port: usize) -> &OutputUnit {
        &self.output_units[port]
    }

    pub fn switch_allocator(&self) -> &SwitchAllocator {
        &self.sw_alloc
    }

    pub(crate) fn outport_buffer_mut(
        &mut self,
        port: usize,
    ) -> &mut crate::buffer::TimedBuffer<crate::flit::Flit> {
        self.output_units[port].out_buffer_mut()
    }

    pub(crate) fn inport_credit_queue_mut(
        &mut self,
        port: usize,
    ) -> &mut crate::buffer::TimedBuffer<crate::flit::Credit> {
        self.input_units[port].credit_queue_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn params() -> NetworkParams {
        NetworkParams::from_config(&SimConfig::default())
    }

    #[test]
    fn test_port_registration() {
        let p = params();
        let mut router = Router::new(0, 0, 0, 0, &p);

        assert_eq!(router.add_in_port(Direction::Local, 0, 1), 0);
        assert_eq!(router.add_in_port(Direction::West, 2, 3), 1);
        assert_eq!(
            router.add_out_port(
                Direction::East,
                4,
                vec![NetDest::new(); p.num_vnets],
                1,
                5,
                &p
            ),
            0
        );

        assert_eq!(router.num_inports(), 2);
        assert_eq!(router.num_outports(), 1);
        assert_eq!(router.outport_for_direction(Direction::East), Some(0));
        assert_eq!(router.outport_for_direction(Direction::West), None);
    }

    #[test]
    fn test_wakeup_runs_once_per_cycle() {
        let p = params();
        let mut router = Router::new(0, 0, 0, 0, &p);
        router.init();

        let mut queue = EventQueue::new();
        let mut links: Vec<NetworkLink> = Vec::new();
        let mut credit_links: Vec<CreditLink> = Vec::new();

        router.wakeup(&mut links, &mut credit_links, &mut queue, &p);
        assert_eq!(router.last_wakeup, Some(0));

        // A second call in the same cycle is a no-op; a later cycle runs.
        router.wakeup(&mut links, &mut credit_links, &mut queue, &p);
        queue.advance_to(1);
        router.wakeup(&mut links, &mut credit_links, &mut queue, &p);
        assert_eq!(router.last_wakeup, Some(1));
    }
}
