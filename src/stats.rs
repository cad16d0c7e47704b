//! Traffic statistics collection and export.
//!
//! [`NetworkStats`] holds the raw counters bumped at injection and
//! ejection; [`StatsReport`] is the collated end-of-run view with derived
//! averages, printable as a human-readable summary or exportable as JSON.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::types::Cycle;

/// Raw per-vnet counters, updated during simulation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub injected_packets: Vec<u64>,
    pub received_packets: Vec<u64>,
    pub injected_flits: Vec<u64>,
    pub received_flits: Vec<u64>,

    /// Sum of per-packet network latency (inject to eject), per vnet.
    pub packet_network_latency: Vec<u64>,
    /// Sum of per-packet source queueing latency, per vnet.
    pub packet_queueing_latency: Vec<u64>,
    pub flit_network_latency: Vec<u64>,
    pub flit_queueing_latency: Vec<u64>,

    /// Router traversals summed over received packets.
    pub total_hops: u64,
}

impl NetworkStats {
    pub fn new(num_vnets: usize) -> Self {
        Self {
            injected_packets: vec![0; num_vnets],
            received_packets: vec![0; num_vnets],
            injected_flits: vec![0; num_vnets],
            received_flits: vec![0; num_vnets],
            packet_network_latency: vec![0; num_vnets],
            packet_queueing_latency: vec![0; num_vnets],
            flit_network_latency: vec![0; num_vnets],
            flit_queueing_latency: vec![0; num_vnets],
            total_hops: 0,
        }
    }

    pub fn record_packet_injected(&mut self, vnet: usize) {
        self.injected_packets[vnet] += 1;
    }

    pub fn record_flit_injected(&mut self, vnet: usize) {
        self.injected_flits[vnet] += 1;
    }

    pub fn record_flit_received(&mut self, vnet: usize, network_latency: Cycle, queueing_latency: Cycle) {
        self.received_flits[vnet] += 1;
        self.flit_network_latency[vnet] += network_latency;
        self.flit_queueing_latency[vnet] += queueing_latency;
    }

    pub fn record_packet_received(
        &mut self,
        vnet: usize,
        network_latency: Cycle,
        queueing_latency: Cycle,
        hops: u64,
    ) {
        self.received_packets[vnet] += 1;
        self.packet_network_latency[vnet] += network_latency;
        self.packet_queueing_latency[vnet] += queueing_latency;
        self.total_hops += hops;
    }

    pub fn total_injected_packets(&self) -> u64 {
        self.injected_packets.iter().sum()
    }

    pub fn total_received_packets(&self) -> u64 {
        self.received_packets.iter().sum()
    }

    pub fn total_injected_flits(&self) -> u64 {
        self.injected_flits.iter().sum()
    }

    pub fn total_received_flits(&self) -> u64 {
        self.received_flits.iter().sum()
    }

    /// Mean inject-to-eject latency over all received packets.
    pub fn average_network_latency(&self) -> f64 {
        let received = self.total_received_packets();
        if received == 0 {
            return 0.0;
        }
        self.packet_network_latency.iter().sum::<u64>() as f64 / received as f64
    }

    pub fn average_queueing_latency(&self) -> f64 {
        let received = self.total_received_packets();
        if received == 0 {
            return 0.0;
        }
        self.packet_queueing_latency.iter().sum::<u64>() as f64 / received as f64
    }

    pub fn average_hops(&self) -> f64 {
        let received = self.total_received_packets();
        if received == 0 {
            return 0.0;
        }
        self.total_hops as f64 / received as f64
    }
}

/// Per-vnet slice of the final report.
#[derive(Clone, Debug, Serialize)]
pub struct VnetReport {
    pub vnet: usize,
    pub received_packets: u64,
    pub average_latency: f64,
}

/// Collated end-of-run statistics.
#[derive(Clone, Debug, Serialize)]
pub struct StatsReport {
    pub cycles: Cycle,
    pub packets_injected: u64,
    pub packets_received: u64,
    pub flits_injected: u64,
    pub flits_received: u64,
    pub average_network_latency: f64,
    pub average_queueing_latency: f64,
    pub average_hops: f64,
    pub vnets: Vec<VnetReport>,
    /// Mean fraction of cycles each flit link carried a flit.
    pub average_link_utilization: f64,
}

impl StatsReport {
    pub fn collate(
        stats: &NetworkStats,
        cycles: Cycle,
        total_link_utilization: u64,
        num_links: usize,
    ) -> Self {
        let vnets = stats
            .received_packets
            .iter()
            .enumerate()
            .map(|(vnet, &received)| VnetReport {
                vnet,
                received_packets: received,
                average_latency: if received > 0 {
                    stats.packet_network_latency[vnet] as f64 / received as f64
                } else {
                    0.0
                },
            })
            .collect();

        let average_link_utilization = if num_links > 0 && cycles > 0 {
            total_link_utilization as f64 / num_links as f64 / cycles as f64
        } else {
            0.0
        };

        Self {
            cycles,
            packets_injected: stats.total_injected_packets(),
            packets_received: stats.total_received_packets(),
            flits_injected: stats.total_injected_flits(),
            flits_received: stats.total_received_flits(),
            average_network_latency: stats.average_network_latency(),
            average_queueing_latency: stats.average_queueing_latency(),
            average_hops: stats.average_hops(),
            vnets,
            average_link_utilization,
        }
    }

    /// Serializes the report as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the human-readable summary.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "Simulation Statistics:")?;
        writeln!(w, "  - Total Cycles: {}", self.cycles)?;
        writeln!(w, "  - Packets Injected: {}", self.packets_injected)?;
        writeln!(w, "  - Packets Received: {}", self.packets_received)?;
        if self.packets_received > 0 {
            writeln!(
                w,
                "  - Average Network Latency: {:.2} cycles",
                self.average_network_latency
            )?;
            writeln!(
                w,
                "  - Average Queueing Latency: {:.2} cycles",
                self.average_queueing_latency
            )?;
            writeln!(w, "  - Average Hops: {:.2}", self.average_hops)?;
            for vnet in &self.vnets {
                if vnet.received_packets > 0 {
                    writeln!(
                        w,
                        "    - VNet {}: Rx={}, Lat={:.2}",
                        vnet.vnet, vnet.received_packets, vnet.average_latency
                    )?;
                }
            }
        }
        writeln!(
            w,
            "  - Average Link Utilization: {:.2} %",
            self.average_link_utilization * 100.0
        )?;
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        self.write_summary(&mut buf).expect("writing to Vec cannot fail");
        String::from_utf8(buf).expect("summary is valid UTF-8")
    }
}
