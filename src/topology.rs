//! Topology construction: built-in meshes and `.conf` topology files.
//!
//! The factory keys on the topology name: `Mesh_XY` builds a
//! rows-by-cols-by-depth mesh, a path ending in `.conf` is parsed as a
//! topology file, anything else is a configuration error.
//!
//! Topology files are plain text with keyword-introduced sections:
//!
//! ```text
//! NumRouters 4
//! 0 0 0 0
//! ...
//! NumNIs 4
//! 0 0 0 0
//! ...
//! ExtLinks
//! <ni_id> <router_id>
//! IntLinks
//! <src> <dst> <latency> <weight> <src_port_dir> <dst_port_dir>
//! RoutingTables
//! <router_id> <dest_ni> <port>
//! ```
//!
//! Lines starting with `#` and blank lines are ignored. Files are parsed
//! completely and validated before anything is instantiated, so a broken
//! file never leaves a half-built network behind.

use std::collections::HashMap;
use std::path::Path;

use crate::config::{ConfigError, ConfigResult, SimConfig};
use crate::network::{Network, NetworkParams};
use crate::traffic::SyntheticTraffic;
use crate::types::{Cycle, Direction, NiId, RouterId};

/// Interner for port-direction labels in topology files.
///
/// The compass names map to their enum variants; any other label gets a
/// `Named` index, stable for the lifetime of the table.
#[derive(Debug, Default)]
pub struct DirectionTable {
    names: Vec<String>,
    indices: HashMap<String, u16>,
}

impl DirectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, label: &str) -> Direction {
        match label {
            "Local" => Direction::Local,
            "North" => Direction::North,
            "South" => Direction::South,
            "East" => Direction::East,
            "West" => Direction::West,
            "Up" => Direction::Up,
            "Down" => Direction::Down,
            other => {
                if let Some(&index) = self.indices.get(other) {
                    Direction::Named(index)
                } else {
                    let index = self.names.len() as u16;
                    self.names.push(other.to_string());
                    self.indices.insert(other.to_string(), index);
                    Direction::Named(index)
                }
            }
        }
    }

    pub fn name(&self, direction: Direction) -> String {
        match direction {
            Direction::Named(index) => self.names[index as usize].clone(),
            other => other.to_string(),
        }
    }
}

/// Builds the network described by `config`.
pub fn build(config: &SimConfig) -> ConfigResult<Network> {
    config.validate()?;
    if config.topology == "Mesh_XY" {
        build_mesh(config)
    } else if config.topology.ends_with(".conf") {
        let file = parse_topology_file(&config.topology)?;
        instantiate(&file, config)
    } else {
        Err(ConfigError::UnknownTopology(config.topology.clone()))
    }
}

/// Builds a rows x cols x depth mesh with one NI per router.
///
/// Router `i` sits at `(i % cols, (i / cols) % rows, i / (cols * rows))`.
/// Every router also gets dimension-order routing-table entries so the
/// table-lookup algorithm works on meshes without a topology file.
fn build_mesh(config: &SimConfig) -> ConfigResult<Network> {
    let params = NetworkParams::from_config(config);
    let mut net = Network::new(params, config.fault_model);

    let rows = config.rows;
    let cols = config.cols;
    let depth = config.depth;
    let num_routers = rows * cols * depth;
    let router_of_ni: Vec<RouterId> = (0..num_routers).collect();

    for i in 0..num_routers {
        let x = i % cols;
        let y = (i / cols) % rows;
        let z = i / (cols * rows);
        net.add_router(x, y, z);
        let traffic = SyntheticTraffic::new(i, num_routers, router_of_ni.clone(), config);
        net.add_ni(x, y, z, Box::new(traffic));
    }

    for i in 0..num_routers {
        net.connect_ni_to_router(i, i);
    }

    for z in 0..depth {
        for col in 0..cols {
            for row in 0..rows {
                let curr = z * rows * cols + row * cols + col;

                if row + 1 < rows {
                    let south = curr + cols;
                    net.connect_routers(curr, south, 1, 1, Direction::South, Direction::North);
                    net.connect_routers(south, curr, 1, 1, Direction::North, Direction::South);
                }
                if col + 1 < cols {
                    let east = curr + 1;
                    net.connect_routers(curr, east, 1, 1, Direction::East, Direction::West);
                    net.connect_routers(east, curr, 1, 1, Direction::West, Direction::East);
                }
                if z + 1 < depth {
                    let up = curr + rows * cols;
                    net.connect_routers(curr, up, 1, 1, Direction::Up, Direction::Down);
                    net.connect_routers(up, curr, 1, 1, Direction::Down, Direction::Up);
                }
            }
        }
    }

    populate_mesh_routing_tables(&mut net, rows, cols, depth)?;
    Ok(net)
}

/// Fills each mesh router's table with the dimension-order next hop for
/// every destination NI.
fn populate_mesh_routing_tables(
    net: &mut Network,
    rows: usize,
    cols: usize,
    depth: usize,
) -> ConfigResult<()> {
    let num_routers = rows * cols * depth;
    for router in 0..num_routers {
        let (x, y, z) = (
            router % cols,
            (router / cols) % rows,
            router / (cols * rows),
        );
        for dest in 0..num_routers {
            let (dx, dy, dz) = (dest % cols, (dest / cols) % rows, dest / (cols * rows));
            let dirn = if dx != x {
                if dx > x {
                    Direction::East
                } else {
                    Direction::West
                }
            } else if dy != y {
                if dy > y {
                    Direction::South
                } else {
                    Direction::North
                }
            } else if dz != z {
                if dz > z {
                    Direction::Up
                } else {
                    Direction::Down
                }
            } else {
                Direction::Local
            };
            let port = net
                .router(router)
                .outport_for_direction(dirn)
                .expect("mesh wiring covers every dimension-order direction");
            net.add_route_for_port(router, port, dest)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
struct NodeSpec {
    id: usize,
    x: usize,
    y: usize,
    z: usize,
}

#[derive(Debug)]
struct IntLinkSpec {
    src: RouterId,
    dst: RouterId,
    latency: Cycle,
    weight: u32,
    src_dirn: String,
    dst_dirn: String,
}

#[derive(Debug, Default)]
struct TopologyFile {
    path: String,
    routers: Vec<NodeSpec>,
    nis: Vec<NodeSpec>,
    ext_links: Vec<(NiId, RouterId)>,
    int_links: Vec<IntLinkSpec>,
    routes: Vec<(RouterId, NiId, usize)>,
}

#[derive(Clone, Copy)]
enum ParseSection {
    Header,
    Routers(usize),
    Nis(usize),
    ExtLinks,
    IntLinks,
    RoutingTables,
}

fn parse_topology_file<P: AsRef<Path>>(path: P) -> ConfigResult<TopologyFile> {
    let path_str = path.as_ref().display().to_string();
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::TopologyFile {
        file: path_str.clone(),
        line: 0,
        msg: format!("cannot open: {e}"),
    })?;

    let err = |line: usize, msg: String| ConfigError::TopologyFile {
        file: path_str.clone(),
        line,
        msg,
    };

    let mut file = TopologyFile {
        path: path_str.clone(),
        ..TopologyFile::default()
    };
    let mut section = ParseSection::Header;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        // Node rows are consumed by count; keywords switch sections.
        match section {
            ParseSection::Routers(remaining) => {
                file.routers.push(parse_node(&fields, line_no, &err)?);
                section = if remaining > 1 {
                    ParseSection::Routers(remaining - 1)
                } else {
                    ParseSection::Header
                };
                continue;
            }
            ParseSection::Nis(remaining) => {
                file.nis.push(parse_node(&fields, line_no, &err)?);
                section = if remaining > 1 {
                    ParseSection::Nis(remaining - 1)
                } else {
                    ParseSection::Header
                };
                continue;
            }
            _ => {}
        }

        match fields[0] {
            "NumRouters" => {
                let count = parse_field::<usize>(&fields, 1, line_no, &err)?;
                if count > 0 {
                    section = ParseSection::Routers(count);
                }
            }
            "NumNIs" => {
                let count = parse_field::<usize>(&fields, 1, line_no, &err)?;
                if count > 0 {
                    section = ParseSection::Nis(count);
                }
            }
            "ExtLinks" => section = ParseSection::ExtLinks,
            "IntLinks" => section = ParseSection::IntLinks,
            "RoutingTables" => section = ParseSection::RoutingTables,
            _ => match section {
                ParseSection::ExtLinks => {
                    let ni = parse_field::<usize>(&fields, 0, line_no, &err)?;
                    let router = parse_field::<usize>(&fields, 1, line_no, &err)?;
                    file.ext_links.push((ni, router));
                }
                ParseSection::IntLinks => {
                    if fields.len() < 6 {
                        return Err(err(
                            line_no,
                            "internal link needs <src> <dst> <latency> <weight> <src_dir> <dst_dir>"
                                .to_string(),
                        ));
                    }
                    file.int_links.push(IntLinkSpec {
                        src: parse_field(&fields, 0, line_no, &err)?,
                        dst: parse_field(&fields, 1, line_no, &err)?,
                        latency: parse_field(&fields, 2, line_no, &err)?,
                        weight: parse_field(&fields, 3, line_no, &err)?,
                        src_dirn: fields[4].to_string(),
                        dst_dirn: fields[5].to_string(),
                    });
                }
                ParseSection::RoutingTables => {
                    let router = parse_field::<usize>(&fields, 0, line_no, &err)?;
                    let dest_ni = parse_field::<usize>(&fields, 1, line_no, &err)?;
                    let port = parse_field::<usize>(&fields, 2, line_no, &err)?;
                    file.routes.push((router, dest_ni, port));
                }
                _ => {
                    return Err(err(line_no, format!("unexpected line: {line}")));
                }
            },
        }
    }

    match section {
        ParseSection::Routers(remaining) => {
            return Err(err(0, format!("{remaining} router rows missing at end of file")));
        }
        ParseSection::Nis(remaining) => {
            return Err(err(0, format!("{remaining} NI rows missing at end of file")));
        }
        _ => {}
    }

    validate_topology_file(&file)?;
    Ok(file)
}

fn parse_node(
    fields: &[&str],
    line_no: usize,
    err: &impl Fn(usize, String) -> ConfigError,
) -> ConfigResult<NodeSpec> {
    if fields.len() < 4 {
        return Err(err(line_no, "node row needs <id> <x> <y> <z>".to_string()));
    }
    Ok(NodeSpec {
        id: parse_field(fields, 0, line_no, err)?,
        x: parse_field(fields, 1, line_no, err)?,
        y: parse_field(fields, 2, line_no, err)?,
        z: parse_field(fields, 3, line_no, err)?,
    })
}

fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    index: usize,
    line_no: usize,
    err: &impl Fn(usize, String) -> ConfigError,
) -> ConfigResult<T> {
    let raw = fields
        .get(index)
        .ok_or_else(|| err(line_no, format!("missing field {}", index + 1)))?;
    raw.parse()
        .map_err(|_| err(line_no, format!("cannot parse field {}: {raw}", index + 1)))
}

fn validate_topology_file(file: &TopologyFile) -> ConfigResult<()> {
    let err = |msg: String| ConfigError::TopologyFile {
        file: file.path.clone(),
        line: 0,
        msg,
    };

    for (index, router) in file.routers.iter().enumerate() {
        if router.id != index {
            return Err(err(format!(
                "router ids must be dense and in order; found {} at position {index}",
                router.id
            )));
        }
    }
    for (index, ni) in file.nis.iter().enumerate() {
        if ni.id != index {
            return Err(err(format!(
                "NI ids must be dense and in order; found {} at position {index}",
                ni.id
            )));
        }
    }

    let mut attachment = vec![0usize; file.nis.len()];
    for &(ni, router) in &file.ext_links {
        if ni >= file.nis.len() {
            return Err(err(format!("external link references unknown NI {ni}")));
        }
        if router >= file.routers.len() {
            return Err(err(format!("external link references unknown router {router}")));
        }
        attachment[ni] += 1;
    }
    if let Some(ni) = attachment.iter().position(|&count| count != 1) {
        return Err(err(format!(
            "NI {ni} must have exactly one external link, found {}",
            attachment[ni]
        )));
    }

    for link in &file.int_links {
        if link.src >= file.routers.len() || link.dst >= file.routers.len() {
            return Err(err(format!(
                "internal link references unknown router {} or {}",
                link.src, link.dst
            )));
        }
        if link.latency == 0 {
            return Err(err(format!(
                "internal link {} -> {} must have latency of at least one cycle",
                link.src, link.dst
            )));
        }
    }

    for &(router, dest_ni, _) in &file.routes {
        if router >= file.routers.len() {
            return Err(err(format!("routing table references unknown router {router}")));
        }
        if dest_ni >= file.nis.len() {
            return Err(err(format!("routing table references unknown NI {dest_ni}")));
        }
    }

    Ok(())
}

fn instantiate(file: &TopologyFile, config: &SimConfig) -> ConfigResult<Network> {
    let params = NetworkParams::from_config(config);
    let mut net = Network::new(params, config.fault_model);
    let mut directions = DirectionTable::new();

    for router in &file.routers {
        net.add_router(router.x, router.y, router.z);
    }

    let mut router_of_ni = vec![0; file.nis.len()];
    for &(ni, router) in &file.ext_links {
        router_of_ni[ni] = router;
    }

    for ni in &file.nis {
        let traffic =
            SyntheticTraffic::new(ni.id, file.nis.len(), router_of_ni.clone(), config);
        net.add_ni(ni.x, ni.y, ni.z, Box::new(traffic));
    }

    for &(ni, router) in &file.ext_links {
        net.connect_ni_to_router(ni, router);
    }

    for link in &file.int_links {
        let src_dirn = directions.parse(&link.src_dirn);
        let dst_dirn = directions.parse(&link.dst_dirn);
        net.connect_routers(
            link.src,
            link.dst,
            link.latency,
            link.weight,
            src_dirn,
            dst_dirn,
        );
    }

    for &(router, dest_ni, port) in &file.routes {
        net.add_route_for_port(router, port, dest_ni)?;
    }

    Ok(net)
}
