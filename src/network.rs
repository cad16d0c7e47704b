//! The network arena and the cycle driver.
//!
//! [`Network`] owns every router, NI, link, and credit link in flat
//! vectors, plus the event queue and the statistics counters. Components
//! refer to each other only through arena indices, so the ownership graph
//! is a tree even though the physical graph is cyclic. Data moves between
//! components by value through owned queues.
//!
//! The driver advances the timeline in two phases per cycle: phase A wakes
//! every NI and every router exactly once, phase B drains all events due
//! at the current cycle and dispatches them on their [`WakeTarget`] tag.
//! Anything a producer stamps "for the next cycle" carries an absolute
//! timestamp, so it is never observable early no matter how wakes
//! interleave.

use crate::config::{ConfigError, ConfigResult, RoutingAlgorithm, SimConfig};
use crate::event::{EventQueue, WakeTarget};
use crate::fault::FaultModel;
use crate::flit::NetDest;
use crate::link::{CreditLink, EndpointRef, Link, NetworkLink};
use crate::ni::NetworkInterface;
use crate::router::Router;
use crate::stats::{NetworkStats, StatsReport};
use crate::traffic::TrafficGenerator;
use crate::types::{Cycle, Direction, LinkId, NiId, RouterId, VnetType};

/// Shape and sizing parameters shared by every component.
#[derive(Clone, Debug)]
pub struct NetworkParams {
    pub num_rows: usize,
    pub num_cols: usize,
    pub num_depth: usize,
    pub num_vnets: usize,
    pub vcs_per_vnet: usize,
    pub buffers_per_data_vc: u32,
    pub buffers_per_ctrl_vc: u32,
    pub ni_flit_size: u32,
    pub routing_algorithm: RoutingAlgorithm,
    pub router_latency: Cycle,
}

impl NetworkParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            num_rows: config.rows,
            num_cols: config.cols,
            num_depth: config.depth,
            num_vnets: config.vnets,
            vcs_per_vnet: config.vcs_per_vnet,
            buffers_per_data_vc: config.buffers_per_data_vc,
            buffers_per_ctrl_vc: config.buffers_per_ctrl_vc,
            ni_flit_size: config.ni_flit_size,
            routing_algorithm: config.routing,
            router_latency: config.router_latency,
        }
    }

    pub fn num_vcs(&self) -> usize {
        self.num_vnets * self.vcs_per_vnet
    }

    /// Vnet 0 carries the control class; the rest carry data.
    pub fn vnet_type(&self, vnet: usize) -> VnetType {
        if vnet == 0 {
            VnetType::Ctrl
        } else {
            VnetType::Data
        }
    }

    /// Downstream buffer depth for VCs of `vnet`.
    pub fn buffers_for_vnet(&self, vnet: usize) -> u32 {
        match self.vnet_type(vnet) {
            VnetType::Ctrl => self.buffers_per_ctrl_vc,
            VnetType::Data => self.buffers_per_data_vc,
        }
    }
}

/// The fabric: all components, the event queue, and the statistics.
#[derive(Debug)]
pub struct Network {
    params: NetworkParams,
    queue: EventQueue,
    routers: Vec<Router>,
    nis: Vec<NetworkInterface>,
    links: Vec<NetworkLink>,
    credit_links: Vec<CreditLink>,
    fault_model: Option<FaultModel>,
    stats: NetworkStats,
    cycles_simulated: Cycle,
}

impl Network {
    pub fn new(params: NetworkParams, enable_fault_model: bool) -> Self {
        let stats = NetworkStats::new(params.num_vnets);
        Self {
            params,
            queue: EventQueue::new(),
            routers: Vec::new(),
            nis: Vec::new(),
            links: Vec::new(),
            credit_links: Vec::new(),
            fault_model: enable_fault_model.then(FaultModel::new),
            stats,
            cycles_simulated: 0,
        }
    }

    pub fn add_router(&mut self, x: usize, y: usize, z: usize) -> RouterId {
        let id = self.routers.len();
        self.routers.push(Router::new(id, x, y, z, &self.params));
        id
    }

    pub fn add_ni(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        traffic: Box<dyn TrafficGenerator>,
    ) -> NiId {
        let id = self.nis.len();
        self.nis
            .push(NetworkInterface::new(id, x, y, z, &self.params, traffic));
        id
    }

    fn new_network_link(&mut self, latency: Cycle) -> LinkId {
        let id = self.links.len();
        let mut link = Link::new(id, latency);
        link.set_num_vcs(self.params.num_vcs());
        self.links.push(link);
        id
    }

    fn new_credit_link(&mut self, latency: Cycle) -> LinkId {
        let id = self.credit_links.len();
        let mut link = Link::new(id, latency);
        link.set_num_vcs(self.params.num_vcs());
        self.credit_links.push(link);
        id
    }

    /// Wires the external link pair between an NI and its router: a data
    /// link each way, each with a one-cycle credit link running opposite.
    pub fn connect_ni_to_router(&mut self, ni: NiId, router: RouterId) {
        // NI to router.
        let link = self.new_network_link(1);
        let credit = self.new_credit_link(1);
        let inport = self.routers[router].add_in_port(Direction::Local, link, credit);
        let outport = self.nis[ni].add_out_port(link, credit, router);
        self.links[link].set_source(EndpointRef::NiOutport { ni, port: outport });
        self.links[link].set_consumer(WakeTarget::Router(router));
        self.credit_links[credit].set_source(EndpointRef::RouterInport {
            router,
            port: inport,
        });
        self.credit_links[credit].set_consumer(WakeTarget::Ni(ni));

        // Router to NI.
        let link = self.new_network_link(1);
        let credit = self.new_credit_link(1);
        let entry = vec![NetDest::new(); self.params.num_vnets];
        let outport =
            self.routers[router].add_out_port(Direction::Local, link, entry, 1, credit, &self.params);
        let inport = self.nis[ni].add_in_port(link, credit);
        self.links[link].set_source(EndpointRef::RouterOutport {
            router,
            port: outport,
        });
        self.links[link].set_consumer(WakeTarget::Ni(ni));
        self.credit_links[credit].set_source(EndpointRef::NiInport { ni, port: inport });
        self.credit_links[credit].set_consumer(WakeTarget::Router(router));
    }

    /// Wires one directed internal link from `src` to `dst`, with its
    /// backward credit link.
    pub fn connect_routers(
        &mut self,
        src: RouterId,
        dst: RouterId,
        latency: Cycle,
        weight: u32,
        src_outport_dirn: Direction,
        dst_inport_dirn: Direction,
    ) {
        let link = self.new_network_link(latency);
        let credit = self.new_credit_link(1);
        let entry = vec![NetDest::new(); self.params.num_vnets];
        let outport =
            self.routers[src].add_out_port(src_outport_dirn, link, entry, weight, credit, &self.params);
        let inport = self.routers[dst].add_in_port(dst_inport_dirn, link, credit);

        self.links[link].set_source(EndpointRef::RouterOutport {
            router: src,
            port: outport,
        });
        self.links[link].set_consumer(WakeTarget::Router(dst));
        self.credit_links[credit].set_source(EndpointRef::RouterInport {
            router: dst,
            port: inport,
        });
        self.credit_links[credit].set_consumer(WakeTarget::Router(src));
    }

    /// Adds `dest_ni` to a router outport's destination set.
    pub fn add_route_for_port(
        &mut self,
        router: RouterId,
        port: usize,
        dest_ni: NiId,
    ) -> ConfigResult<()> {
        let r = self.routers.get_mut(router).ok_or_else(|| {
            ConfigError::Validation(format!("routing table references unknown router {router}"))
        })?;
        if port >= r.num_outports() {
            return Err(ConfigError::Validation(format!(
                "routing table references port {port} on router {router}, which has {} outports",
                r.num_outports()
            )));
        }
        r.add_route_for_port(port, dest_ni);
        Ok(())
    }

    /// Finalizes construction: sizes router arbiters and, when the fault
    /// model is enabled, declares every router against its tables.
    pub fn init(&mut self) -> ConfigResult<()> {
        for router in &mut self.routers {
            router.init();
        }
        if let Some(fm) = &mut self.fault_model {
            for router in &self.routers {
                fm.declare_router(
                    router.num_inports(),
                    router.num_outports(),
                    self.params.num_vcs(),
                    self.params.buffers_per_data_vc,
                    self.params.buffers_per_ctrl_vc,
                )?;
            }
        }
        Ok(())
    }

    /// Runs the simulation from cycle 0 through `horizon` inclusive.
    pub fn run(&mut self, horizon: Cycle) {
        for cycle in 0..=horizon {
            self.step(cycle);
        }
        self.cycles_simulated = horizon;
    }

    /// One cycle: wake everything, then drain due events.
    pub fn step(&mut self, cycle: Cycle) {
        self.queue.advance_to(cycle);

        for ni in 0..self.nis.len() {
            self.wake_ni(ni);
        }
        for router in 0..self.routers.len() {
            self.wake_router(router);
        }

        while let Some(event) = self.queue.pop_ready(cycle) {
            match event.target {
                WakeTarget::Router(id) => self.wake_router(id),
                WakeTarget::Ni(id) => self.wake_ni(id),
                WakeTarget::Link(id) => self.wake_link(id),
                WakeTarget::CreditLink(id) => self.wake_credit_link(id),
            }
        }
    }

    fn wake_router(&mut self, id: RouterId) {
        let Network {
            routers,
            links,
            credit_links,
            queue,
            params,
            ..
        } = self;
        routers[id].wakeup(links, credit_links, queue, params);
    }

    fn wake_ni(&mut self, id: NiId) {
        let Network {
            nis,
            links,
            credit_links,
            queue,
            stats,
            params,
            ..
        } = self;
        nis[id].wakeup(links, credit_links, queue, stats, params);
    }

    fn wake_link(&mut self, id: LinkId) {
        let Network {
            routers,
            nis,
            links,
            queue,
            ..
        } = self;
        let link = &mut links[id];
        let source = link
            .source()
            .unwrap_or_else(|| panic!("link {id} woken without a wired source"));
        let src_queue = match source {
            EndpointRef::RouterOutport { router, port } => routers[router].outport_buffer_mut(port),
            EndpointRef::NiOutport { ni, port } => nis[ni].outport_queue_mut(port),
            other => panic!("link {id}: flit links drain outbound flit queues, not {other:?}"),
        };
        link.wakeup(src_queue, queue, WakeTarget::Link(id));
    }

    fn wake_credit_link(&mut self, id: LinkId) {
        let Network {
            routers,
            nis,
            credit_links,
            queue,
            ..
        } = self;
        let link = &mut credit_links[id];
        let source = link
            .source()
            .unwrap_or_else(|| panic!("credit link {id} woken without a wired source"));
        let src_queue = match source {
            EndpointRef::RouterInport { router, port } => {
                routers[router].inport_credit_queue_mut(port)
            }
            EndpointRef::NiInport { ni, port } => nis[ni].inport_credit_queue_mut(port),
            other => panic!("credit link {id}: credit links drain credit queues, not {other:?}"),
        };
        link.wakeup(src_queue, queue, WakeTarget::CreditLink(id));
    }

    /// Collates the final statistics into a report.
    pub fn report(&self) -> StatsReport {
        let total_utilization: u64 = self.links.iter().map(|l| l.utilization()).sum();
        StatsReport::collate(
            &self.stats,
            self.cycles_simulated,
            total_utilization,
            self.links.len(),
        )
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn fault_model(&self) -> Option<&FaultModel> {
        self.fault_model.as_ref()
    }

    pub fn num_routers(&self) -> usize {
        self.routers.len()
    }

    pub fn num_nis(&self) -> usize {
        self.nis.len()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn router(&self, id: RouterId) -> &Router {
        &self.routers[id]
    }

    pub fn ni(&self, id: NiId) -> &NetworkInterface {
        &self.nis[id]
    }

    pub fn link(&self, id: LinkId) -> &NetworkLink {
        &self.links[id]
    }
}
