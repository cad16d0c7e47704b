//! Synthetic traffic generation.
//!
//! The NI pulls flits from a [`TrafficGenerator`] each cycle and pushes
//! ejected flits back into it. The generator owns the flits it creates
//! until the NI admits them, and owns received flits outright. A stalled
//! flit handed back via `requeue_flit` must be re-offered before anything
//! else the next cycle, and a generator never interleaves two packets'
//! flits on the same virtual network.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{SimConfig, TrafficPattern};
use crate::flit::{Flit, NetDest, RouteInfo};
use crate::types::{Cycle, FlitType, NiId, RouterId};

/// Workload attached to one network interface.
pub trait TrafficGenerator: Send + std::fmt::Debug {
    /// Offers the next flit to inject, if any.
    fn send_flit(&mut self, now: Cycle) -> Option<Flit>;

    /// Takes back a flit the NI could not admit this cycle.
    fn requeue_flit(&mut self, flit: Flit);

    /// Accepts an ejected flit; ownership transfers to the generator.
    fn receive_flit(&mut self, flit: Flit, now: Cycle);
}

/// Random or directed synthetic workload.
///
/// Injection is a Bernoulli draw per cycle at the configured rate. In the
/// deterministic test mode NI 0 emits exactly one packet to the last NI
/// and every other generator stays silent.
#[derive(Debug)]
pub struct SyntheticTraffic {
    ni_id: NiId,
    num_nis: usize,
    injection_rate: f64,
    packet_size: usize,
    num_vnets: usize,
    flit_width: u32,
    deterministic: bool,
    fired: bool,
    trace: bool,
    /// Fixed destination, or None for uniform-random.
    destination: Option<NiId>,
    /// Router attached to each NI, for route construction.
    router_of_ni: Vec<RouterId>,
    rng: StdRng,
    pending: VecDeque<Flit>,
    stalled: Option<Flit>,
    packets_generated: u64,
}

impl SyntheticTraffic {
    pub fn new(ni_id: NiId, num_nis: usize, router_of_ni: Vec<RouterId>, config: &SimConfig) -> Self {
        let (injection_rate, destination) = match config.pattern {
            TrafficPattern::Uniform => (config.injection_rate, None),
            TrafficPattern::SingleFlow { src, dest } => {
                if ni_id == src {
                    (config.injection_rate, Some(dest))
                } else {
                    (0.0, None)
                }
            }
        };

        Self {
            ni_id,
            num_nis,
            injection_rate,
            packet_size: config.packet_size,
            num_vnets: config.vnets,
            flit_width: config.ni_flit_size,
            deterministic: config.test_mode,
            fired: false,
            trace: config.trace_packet,
            destination,
            router_of_ni,
            rng: StdRng::seed_from_u64(config.seed + ni_id as u64),
            pending: VecDeque::new(),
            stalled: None,
            packets_generated: 0,
        }
    }

    /// Builds the flits of one packet and queues them for injection.
    fn generate_packet(&mut self, dest: NiId, vnet: usize, now: Cycle) {
        // Packet ids are striped by NI so they are globally unique without
        // shared state.
        let packet_id = self.packets_generated * self.num_nis as u64 + self.ni_id as u64;
        self.packets_generated += 1;

        let mut net_dest = NetDest::new();
        net_dest.add(dest);
        let route = RouteInfo {
            src_ni: self.ni_id,
            dest_ni: dest,
            src_router: self.router_of_ni[self.ni_id],
            dest_router: self.router_of_ni[dest],
            vnet,
            net_dest,
            hops_traversed: 0,
        };

        if self.trace {
            tracing::info!(
                packet = packet_id,
                src = self.ni_id,
                dest,
                vnet,
                cycle = now,
                "packet generated"
            );
        }

        for i in 0..self.packet_size {
            let kind = if self.packet_size == 1 {
                FlitType::HeadTail
            } else if i == 0 {
                FlitType::Head
            } else if i == self.packet_size - 1 {
                FlitType::Tail
            } else {
                FlitType::Body
            };
            let mut flit = Flit::new(
                packet_id,
                i,
                0,
                vnet,
                route.clone(),
                self.packet_size,
                kind,
                self.flit_width,
                now,
            );
            flit.trace = self.trace;
            self.pending.push_back(flit);
        }
    }

    pub fn packets_generated(&self) -> u64 {
        self.packets_generated
    }
}

impl TrafficGenerator for SyntheticTraffic {
    fn send_flit(&mut self, now: Cycle) -> Option<Flit> {
        // A stalled flit goes out again before anything new is produced.
        if let Some(flit) = self.stalled.take() {
            return Some(flit);
        }

        if self.deterministic {
            if self.ni_id == 0 && !self.fired && self.num_nis > 1 {
                self.fired = true;
                self.generate_packet(self.num_nis - 1, 0, now);
            }
        } else if self.injection_rate > 0.0 && self.rng.gen::<f64>() <= self.injection_rate {
            let dest = match self.destination {
                Some(dest) => dest,
                None => {
                    let mut dest = self.rng.gen_range(0..self.num_nis);
                    if dest == self.ni_id {
                        dest = (dest + 1) % self.num_nis;
                    }
                    dest
                }
            };
            let vnet = self.rng.gen_range(0..self.num_vnets);
            self.generate_packet(dest, vnet, now);
        }

        self.pending.pop_front().map(|mut flit| {
            flit.enqueue_time = now;
            flit.src_delay = now - flit.creation_time;
            flit
        })
    }

    fn requeue_flit(&mut self, flit: Flit) {
        debug_assert!(self.stalled.is_none(), "only one flit may stall per cycle");
        self.stalled = Some(flit);
    }

    fn receive_flit(&mut self, flit: Flit, _now: Cycle) {
        // Timing-only simulation: the flit is dropped here, which frees it.
        drop(flit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, packet_size: usize) -> SimConfig {
        let mut config = SimConfig::default();
        config.injection_rate = rate;
        config.packet_size = packet_size;
        config
    }

    fn generator(ni_id: NiId, config: &SimConfig) -> SyntheticTraffic {
        SyntheticTraffic::new(ni_id, 4, vec![0, 1, 2, 3], config)
    }

    #[test]
    fn test_deterministic_mode_emits_one_packet_from_ni0() {
        let mut config = config(0.0, 1);
        config.test_mode = true;

        let mut tg = generator(0, &config);
        let flit = tg.send_flit(0).expect("NI 0 fires at cycle 0");
        assert_eq!(flit.kind, FlitType::HeadTail);
        assert_eq!(flit.route.dest_ni, 3);

        for cycle in 1..10 {
            assert!(tg.send_flit(cycle).is_none());
        }

        let mut other = generator(2, &config);
        assert!(other.send_flit(0).is_none());
    }

    #[test]
    fn test_packet_flit_sequence() {
        let mut config = config(1.0, 4);
        config.vnets = 1;
        let mut tg = generator(0, &config);

        let flits: Vec<Flit> = (0..4).map(|c| tg.send_flit(c).unwrap()).collect();
        assert_eq!(flits[0].kind, FlitType::Head);
        assert_eq!(flits[1].kind, FlitType::Body);
        assert_eq!(flits[2].kind, FlitType::Body);
        assert_eq!(flits[3].kind, FlitType::Tail);
        assert!(flits.iter().all(|f| f.packet_id == flits[0].packet_id));
        assert!(flits.iter().all(|f| f.size == 4));
    }

    #[test]
    fn test_requeue_returns_same_flit_first() {
        let mut tg = generator(0, &config(1.0, 1));

        let flit = tg.send_flit(0).unwrap();
        let packet_id = flit.packet_id;
        tg.requeue_flit(flit);

        let again = tg.send_flit(1).unwrap();
        assert_eq!(again.packet_id, packet_id);
    }

    #[test]
    fn test_uniform_never_targets_self() {
        let mut tg = generator(2, &config(1.0, 1));
        for cycle in 0..200 {
            if let Some(flit) = tg.send_flit(cycle) {
                assert_ne!(flit.route.dest_ni, 2);
            }
        }
    }

    #[test]
    fn test_rate_is_roughly_honored() {
        let mut tg = generator(0, &config(0.5, 1));
        let mut sent = 0;
        for cycle in 0..1000 {
            if tg.send_flit(cycle).is_some() {
                sent += 1;
            }
        }
        assert!(sent > 400 && sent < 600, "sent {sent} packets at rate 0.5");
    }

    #[test]
    fn test_single_flow_pattern_silences_other_nis() {
        let mut config = config(1.0, 1);
        config.pattern = TrafficPattern::SingleFlow { src: 0, dest: 3 };

        let mut src = generator(0, &config);
        let flit = src.send_flit(0).unwrap();
        assert_eq!(flit.route.dest_ni, 3);

        let mut other = generator(1, &config);
        for cycle in 0..50 {
            assert!(other.send_flit(cycle).is_none());
        }
    }

    #[test]
    fn test_packet_ids_unique_across_nis() {
        let config = config(1.0, 1);
        let mut a = generator(0, &config);
        let mut b = generator(1, &config);

        let mut seen = std::collections::HashSet::new();
        for cycle in 0..50 {
            if let Some(f) = a.send_flit(cycle) {
                assert!(seen.insert(f.packet_id));
            }
            if let Some(f) = b.send_flit(cycle) {
                assert!(seen.insert(f.packet_id));
            }
        }
    }

    #[test]
    fn test_enqueue_time_reflects_send_cycle() {
        let mut tg = generator(0, &config(1.0, 2));
        let head = tg.send_flit(5).unwrap();
        assert_eq!(head.enqueue_time, 5);
        let body = tg.send_flit(7).unwrap();
        assert_eq!(body.enqueue_time, 7);
        assert_eq!(body.src_delay, 2);
    }
}
