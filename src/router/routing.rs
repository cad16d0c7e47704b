//! Destination-to-outport computation.
//!
//! Two modes: deterministic dimension-order (X, then Y, then Z) for mesh
//! shapes, and weighted table lookup for arbitrary topologies. Dimension
//! order falls through to the table when it cannot resolve a direction, so
//! file topologies with partial compass wiring still route. Computation is
//! side-effect-free; the unit is only mutated while ports are added during
//! construction.

use std::collections::HashMap;

use crate::config::RoutingAlgorithm;
use crate::flit::{NetDest, RouteInfo};
use crate::network::NetworkParams;
use crate::router::RouterInfo;
use crate::types::Direction;

/// Per-router routing state: the table, link weights, and the maps from
/// port direction to port index built up as ports are added.
#[derive(Debug)]
pub struct RoutingUnit {
    /// Destination sets indexed by `[vnet][outport]`.
    routing_table: Vec<Vec<NetDest>>,
    /// Link weight per outport; lower is preferred.
    weight_table: Vec<u32>,
    in_dirn_to_port: HashMap<Direction, usize>,
    out_dirn_to_port: HashMap<Direction, usize>,
}

impl RoutingUnit {
    pub fn new(num_vnets: usize) -> Self {
        Self {
            routing_table: vec![Vec::new(); num_vnets],
            weight_table: Vec::new(),
            in_dirn_to_port: HashMap::new(),
            out_dirn_to_port: HashMap::new(),
        }
    }

    /// Appends one routing-table column for a newly added outport.
    pub fn add_route(&mut self, entry: Vec<NetDest>) {
        assert_eq!(
            entry.len(),
            self.routing_table.len(),
            "routing entry must cover every vnet"
        );
        for (vnet, dest) in entry.into_iter().enumerate() {
            self.routing_table[vnet].push(dest);
        }
    }

    pub fn add_weight(&mut self, weight: u32) {
        self.weight_table.push(weight);
    }

    /// Adds `dest_ni` to an outport's destination set across all vnets.
    ///
    /// Used by the `RoutingTables` section of topology files, which is not
    /// vnet-aware.
    pub fn add_route_for_port(&mut self, port: usize, dest_ni: usize) {
        for table in &mut self.routing_table {
            if table.len() <= port {
                table.resize(port + 1, NetDest::new());
            }
            table[port].add(dest_ni);
        }
        if self.weight_table.len() <= port {
            self.weight_table.resize(port + 1, 1);
        }
    }

    pub fn add_in_direction(&mut self, dirn: Direction, port: usize) {
        self.in_dirn_to_port.insert(dirn, port);
    }

    pub fn add_out_direction(&mut self, dirn: Direction, port: usize) {
        self.out_dirn_to_port.insert(dirn, port);
    }

    pub fn outport_for_direction(&self, dirn: Direction) -> Option<usize> {
        self.out_dirn_to_port.get(&dirn).copied()
    }

    /// Computes the outport for a packet entering this router.
    ///
    /// Panics when neither dimension-order nor the table yields a port;
    /// an unroutable packet means the topology is wired wrong, which is a
    /// bug in construction, not a runtime condition.
    pub fn outport_compute(
        &self,
        route: &RouteInfo,
        info: RouterInfo,
        params: &NetworkParams,
    ) -> usize {
        if params.routing_algorithm == RoutingAlgorithm::Xy {
            if let Some(port) = self.outport_compute_xy(route, info, params) {
                return port;
            }
        }

        self.lookup_routing_table(route.vnet, &route.net_dest)
            .unwrap_or_else(|| {
                panic!(
                    "router {}: no route to NI {} (vnet {})",
                    info.id, route.dest_ni, route.vnet
                )
            })
    }

    /// Dimension-order routing: resolve X first, then Y, then Z.
    ///
    /// Destination coordinates derive from the destination router id and
    /// the mesh shape. Returns `None` when the required direction has no
    /// port on this router.
    fn outport_compute_xy(
        &self,
        route: &RouteInfo,
        info: RouterInfo,
        params: &NetworkParams,
    ) -> Option<usize> {
        let cols = params.num_cols;
        let rows = params.num_rows;

        let dest_x = route.dest_router % cols;
        let dest_y = (route.dest_router / cols) % rows;
        let dest_z = route.dest_router / (cols * rows);

        let dirn = if dest_x != info.x {
            if dest_x > info.x {
                Direction::East
            } else {
                Direction::West
            }
        } else if dest_y != info.y {
            if dest_y > info.y {
                Direction::South
            } else {
                Direction::North
            }
        } else if dest_z != info.z {
            if dest_z > info.z {
                Direction::Up
            } else {
                Direction::Down
            }
        } else {
            Direction::Local
        };

        self.outport_for_direction(dirn)
    }

    /// Weighted table lookup.
    ///
    /// Candidates are outports whose destination set intersects the
    /// packet's; among them the minimum link weight wins, first-listed
    /// breaking ties.
    fn lookup_routing_table(&self, vnet: usize, dest: &NetDest) -> Option<usize> {
        let table = self.routing_table.get(vnet)?;

        let min_weight = table
            .iter()
            .enumerate()
            .filter(|(_, entry)| dest.intersects(entry))
            .map(|(port, _)| self.weight_table.get(port).copied().unwrap_or(1))
            .min()?;

        table
            .iter()
            .enumerate()
            .filter(|(_, entry)| dest.intersects(entry))
            .find(|(port, _)| self.weight_table.get(*port).copied().unwrap_or(1) == min_weight)
            .map(|(port, _)| port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::router::RouterInfo;

    fn params(rows: usize, cols: usize, algorithm: RoutingAlgorithm) -> NetworkParams {
        let mut config = SimConfig::default();
        config.rows = rows;
        config.cols = cols;
        config.routing = algorithm;
        NetworkParams::from_config(&config)
    }

    fn info(id: usize, x: usize, y: usize) -> RouterInfo {
        RouterInfo {
            id,
            x,
            y,
            z: 0,
            pipe_stages: 1,
            num_vnets: 2,
            vcs_per_vnet: 4,
            num_vcs: 8,
        }
    }

    fn route_to(dest_router: usize, dest_ni: usize) -> RouteInfo {
        let mut net_dest = NetDest::new();
        net_dest.add(dest_ni);
        RouteInfo {
            src_ni: 0,
            dest_ni,
            src_router: 0,
            dest_router,
            vnet: 0,
            net_dest,
            hops_traversed: 0,
        }
    }

    fn mesh_unit() -> RoutingUnit {
        let mut unit = RoutingUnit::new(2);
        unit.add_out_direction(Direction::Local, 0);
        unit.add_out_direction(Direction::East, 1);
        unit.add_out_direction(Direction::South, 2);
        unit
    }

    #[test]
    fn test_xy_resolves_x_before_y() {
        let unit = mesh_unit();
        let p = params(2, 2, RoutingAlgorithm::Xy);

        // Router 0 at (0, 0), destination router 3 at (1, 1): X differs,
        // so East wins even though Y differs too.
        let port = unit.outport_compute(&route_to(3, 3), info(0, 0, 0), &p);
        assert_eq!(port, 1);
    }

    #[test]
    fn test_xy_same_column_goes_south() {
        let unit = mesh_unit();
        let p = params(2, 2, RoutingAlgorithm::Xy);

        let port = unit.outport_compute(&route_to(2, 2), info(0, 0, 0), &p);
        assert_eq!(port, 2);
    }

    #[test]
    fn test_xy_at_destination_goes_local() {
        let unit = mesh_unit();
        let p = params(2, 2, RoutingAlgorithm::Xy);

        let port = unit.outport_compute(&route_to(0, 0), info(0, 0, 0), &p);
        assert_eq!(port, 0);
    }

    #[test]
    fn test_table_lookup_prefers_min_weight() {
        let mut unit = RoutingUnit::new(1);

        // Two outports both reach NI 5; the second is cheaper.
        let mut d0 = NetDest::new();
        d0.add(5);
        unit.add_route(vec![d0.clone()]);
        unit.add_weight(3);
        unit.add_route(vec![d0]);
        unit.add_weight(1);

        assert_eq!(unit.lookup_routing_table(0, &{
            let mut d = NetDest::new();
            d.add(5);
            d
        }), Some(1));
    }

    #[test]
    fn test_table_lookup_first_listed_breaks_ties() {
        let mut unit = RoutingUnit::new(1);
        let mut d = NetDest::new();
        d.add(2);
        unit.add_route(vec![d.clone()]);
        unit.add_weight(1);
        unit.add_route(vec![d.clone()]);
        unit.add_weight(1);

        assert_eq!(unit.lookup_routing_table(0, &d), Some(0));
    }

    #[test]
    fn test_table_lookup_no_candidate() {
        let mut unit = RoutingUnit::new(1);
        let mut d = NetDest::new();
        d.add(2);
        unit.add_route(vec![d]);
        unit.add_weight(1);

        let mut other = NetDest::new();
        other.add(9);
        assert_eq!(unit.lookup_routing_table(0, &other), None);
    }

    #[test]
    fn test_route_for_port_spans_all_vnets() {
        let mut unit = RoutingUnit::new(2);
        unit.add_route_for_port(1, 7);

        let mut d = NetDest::new();
        d.add(7);
        assert_eq!(unit.lookup_routing_table(0, &d), Some(1));
        assert_eq!(unit.lookup_routing_table(1, &d), Some(1));
    }

    #[test]
    #[should_panic(expected = "no route")]
    fn test_unroutable_packet_is_fatal() {
        let unit = RoutingUnit::new(2);
        let p = params(2, 2, RoutingAlgorithm::Table);
        unit.outport_compute(&route_to(3, 3), info(0, 0, 0), &p);
    }
}
