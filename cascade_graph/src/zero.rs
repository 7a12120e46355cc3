//! A silence source: gives a domain a pulse without audio hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::fault;
use crate::node::Node;
use crate::property::{PropertyKind, PropertyValue};

/// An in-process driver that ticks an IO node at `config:hz`, publishing the
/// domain's zero buffer on every output each tick.
///
/// The tick rate defaults to one block period (`sample_rate / buffer_size`).
/// `state:cycle_num` counts published cycles; a nonzero `config:max_cycles`
/// stops the ticker after that many cycles. Publishing blocks on link
/// backpressure, so a slow consumer throttles the ticker instead of losing
/// blocks.
///
/// Outputs only: the ticker never parks on the done protocol, so the node
/// should not have graph inputs wired back into it.
pub struct ZeroSource {
    node: Arc<Node>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ZeroSource {
    /// Attach to an IO node. Adds the `config:hz`, `config:max_cycles` and
    /// `state:cycle_num` properties.
    pub fn new(node: Arc<Node>) -> ZeroSource {
        if !node.is_io() {
            fault!("zero source requires an io node, got {}", node.name());
        }
        node.add_property("config:hz", PropertyKind::Integer);
        node.add_property("config:max_cycles", PropertyKind::Integer);
        node.add_property_value("state:cycle_num", PropertyValue::Integer(0));
        ZeroSource {
            node,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Start the ticker thread. Ticks are serial, so publishes from one
    /// cycle can never overlap the next.
    pub fn start(&mut self) {
        if self.thread.is_some() {
            fault!("zero source for node {} is already started", self.node.name());
        }

        let mut hz = self.node.property_integer("config:hz");
        if hz == 0 {
            hz = (self.node.core().sample_rate() as usize / self.node.core().buffer_size()) as i64;
            self.node.set_property_integer("config:hz", hz);
        }
        if hz <= 0 {
            fault!("invalid tick rate {hz} for zero source {}", self.node.name());
        }
        let period = Duration::from_secs_f64(1.0 / hz as f64);

        let node = self.node.clone();
        let stop = self.stop.clone();
        let thread = std::thread::Builder::new()
            .name(format!("zero-source: {}", node.name()))
            .spawn(move || {
                log::debug!("zero source {} is ticking every {period:?}", node.name());
                loop {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }

                    let cycle_num = node.property_integer("state:cycle_num") + 1;
                    node.set_property_integer("state:cycle_num", cycle_num);

                    let zero_buffer = node.core().zero_buffer().clone();
                    for name in node.component().output_names() {
                        node.component()
                            .get_output(&name)
                            .set_buffer(zero_buffer.clone());
                    }

                    let max_cycles = node.property_integer("config:max_cycles");
                    if max_cycles != 0 && cycle_num >= max_cycles {
                        log::debug!("zero source {} reached max_cycles", node.name());
                        return;
                    }

                    std::thread::sleep(period);
                }
            })
            .unwrap_or_else(|e| fault!("could not spawn zero source thread: {e}"));
        self.thread = Some(thread);
    }

    /// Ask the ticker to stop before its next tick.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for the ticker to exit. Only safe to call when the ticker is
    /// known to terminate (stopped, or bounded by `config:max_cycles`) and
    /// its consumers keep resetting their links.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                fault!("zero source thread for node {} aborted", self.node.name());
            }
        }
    }
}

impl Drop for ZeroSource {
    fn drop(&mut self) {
        self.stop();
    }
}
