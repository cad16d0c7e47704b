//! Crossbar: per-cycle flit transfer from switch winners to output units.
//!
//! The allocator deposits at most one winner per input port per cycle, so
//! draining the head of every switch buffer moves at most one flit per
//! input and one per output. Flits leave stamped for the next cycle; the
//! output link takes over from there.

use crate::buffer::{Timed, TimedBuffer};
use crate::event::EventQueue;
use crate::flit::Flit;
use crate::router::output_unit::OutputUnit;
use crate::types::FlitStage;

#[derive(Debug)]
pub struct CrossbarSwitch {
    /// One buffer per input port.
    switch_buffers: Vec<TimedBuffer<Flit>>,
}

impl Default for CrossbarSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossbarSwitch {
    pub fn new() -> Self {
        Self {
            switch_buffers: Vec::new(),
        }
    }

    /// Sizes the switch buffers once all input ports exist.
    pub fn init(&mut self, num_inports: usize) {
        self.switch_buffers = (0..num_inports).map(|_| TimedBuffer::new()).collect();
    }

    /// Deposits a switch winner from `inport`.
    pub fn update_sw_winner(&mut self, inport: usize, flit: Flit) {
        self.switch_buffers[inport].insert(flit);
    }

    /// Moves every traversal-ready winner into its output unit.
    pub fn wakeup(&mut self, output_units: &mut [OutputUnit], queue: &mut EventQueue) {
        let now = queue.now();
        for buffer in &mut self.switch_buffers {
            let ready = buffer
                .peek()
                .map(|f| f.is_stage(FlitStage::SwitchTraversal, now))
                .unwrap_or(false);
            if !ready {
                continue;
            }

            let mut flit = buffer.pop().expect("peeked buffer must pop");
            flit.advance_stage(FlitStage::LinkTraversal, now + 1);
            flit.set_time(now + 1);

            let outport = flit
                .outport
                .expect("flit reached the crossbar without a granted outport");
            output_units[outport].insert(flit, queue);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.switch_buffers.iter().any(|b| !b.is_empty())
    }
}
