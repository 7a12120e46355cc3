//! Channels are the typed endpoints audio moves between: an [`Output`] on a
//! producing node, a [`Link`] carrying one buffer per cycle, and an
//! [`Input`] on a consuming node.
//!
//! The per-cycle protocol is arrival counting: `reset_cycle` arms an input
//! with the number of links and forwards that feed it, every `link_ready`
//! decrements the counter, and the input that reaches zero tells its node's
//! [`Component`](crate::Component) that one more source is satisfied.
//! Forwards are the pass-through edges of forwarder nodes; they multicast
//! arrivals without gating them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use cascade_primitives::Buffer;
use ecow::EcoString;
use smallvec::SmallVec;

use crate::fault;
use crate::node::Node;

/// A waiting-counter snapshot above this limit means the counter
/// underflowed, i.e. more notifications arrived than the cycle was armed
/// for.
pub(crate) const SANITY_WAITING_LIMIT: usize = 1_000_000;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// An input channel on a node.
pub struct Input {
    name: EcoString,
    parent: Weak<Node>,
    links: Mutex<SmallVec<[Arc<Link>; 4]>>,
    /// Inputs on non-forwarder nodes this (forwarder-owned) input multicasts
    /// arrivals to.
    forwards: Mutex<SmallVec<[Arc<Input>; 4]>>,
    links_waiting: AtomicUsize,
    num_forwards_to_us: AtomicUsize,
    /// Buffers that arrived this cycle, keyed by link id.
    arrivals: Mutex<SmallVec<[(u64, Arc<Buffer>); 4]>>,
    /// Reusable fan-in mix buffer, created on first use.
    mix_buffer: Mutex<Option<Arc<Buffer>>>,
}

impl Input {
    pub(crate) fn new(name: EcoString, parent: Weak<Node>) -> Arc<Input> {
        Arc::new(Input {
            name,
            parent,
            links: Mutex::new(SmallVec::new()),
            forwards: Mutex::new(SmallVec::new()),
            links_waiting: AtomicUsize::new(0),
            num_forwards_to_us: AtomicUsize::new(0),
            arrivals: Mutex::new(SmallVec::new()),
            mix_buffer: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }

    pub fn parent(&self) -> Arc<Node> {
        match self.parent.upgrade() {
            Some(node) => node,
            None => fault!("input {} has no parent node", self.name),
        }
    }

    /// Number of notifications still outstanding this cycle.
    pub fn links_waiting(&self) -> usize {
        self.links_waiting.load(Ordering::Acquire)
    }

    pub(crate) fn fan_in(&self) -> usize {
        self.links.lock().unwrap().len() + self.num_forwards_to_us.load(Ordering::Acquire)
    }

    pub(crate) fn register_link(&self, link: Arc<Link>) {
        self.links.lock().unwrap().push(link);
    }

    pub(crate) fn register_forward(&self) {
        self.num_forwards_to_us.fetch_add(1, Ordering::AcqRel);
    }

    /// Link this input to an output on another node.
    pub fn link_to(self: &Arc<Self>, from: &Arc<Output>) {
        link_channels(from, self);
    }

    /// Forward this input through to an input on an interior node. Only
    /// valid when the parent node is a forwarder and the target's parent is
    /// not.
    pub fn forward_to(self: &Arc<Self>, to: &Arc<Input>) {
        let parent = self.parent();
        if !parent.is_forwarder() {
            fault!("node to forward from is not a forwarder: {}", parent.name());
        }
        let to_parent = to.parent();
        if to_parent.is_forwarder() {
            fault!(
                "node to forward to is also a forwarder: {}:{} -> {}:{}",
                parent.name(),
                self.name,
                to_parent.name(),
                to.name
            );
        }
        self.forwards.lock().unwrap().push(to.clone());
        to.register_forward();
    }

    /// Re-arm for the next cycle: clear arrivals, arm the waiting counter,
    /// then open every owning link.
    ///
    /// The counter is armed before the links are reset so a producer woken
    /// by a reset counts against the fresh cycle instead of the stale
    /// counter.
    pub fn reset_cycle(&self) {
        self.arrivals.lock().unwrap().clear();

        let waiting = self.fan_in();
        log::trace!("resetting input {}, now waiting for {}", self.name, waiting);
        self.links_waiting.store(waiting, Ordering::Release);

        let links: SmallVec<[Arc<Link>; 4]> = self.links.lock().unwrap().clone();
        for link in links {
            link.reset();
        }
    }

    /// A producer published a buffer on one of our links (or one of the
    /// forwarder links feeding us).
    pub fn link_ready(&self, link_id: u64, buffer: &Arc<Buffer>) {
        self.arrivals.lock().unwrap().push((link_id, buffer.clone()));

        let now_waiting = self.links_waiting.fetch_sub(1, Ordering::AcqRel) - 1;
        log::trace!(
            "waiting buffers: {now_waiting}; input: {}:{}",
            self.parent().name(),
            self.name
        );

        if now_waiting > SANITY_WAITING_LIMIT {
            fault!(
                "sanity check failed; waiting for {now_waiting} on input {}:{}",
                self.parent().name(),
                self.name
            );
        }

        if now_waiting == 0 {
            self.parent().component().source_ready(self);
        }

        let forwards: SmallVec<[Arc<Input>; 4]> = self.forwards.lock().unwrap().clone();
        for forward in forwards {
            log::trace!(
                "input {}:{} forwarding to {}:{}",
                self.parent().name(),
                self.name,
                forward.parent().name(),
                forward.name
            );
            forward.link_ready(link_id, buffer);
        }
    }

    /// The buffer this input contributes to its node's cycle:
    ///
    /// - no links and no forwards: the domain's zero buffer,
    /// - exactly one: that arrival's buffer, zero-copy,
    /// - two or more: the arrivals summed into the reusable mix buffer.
    pub fn get_buffer(&self) -> Arc<Buffer> {
        let parent = self.parent();
        match self.fan_in() {
            0 => {
                log::trace!("returning zero buffer for {}:{}", parent.name(), self.name);
                parent.core().zero_buffer().clone()
            }
            1 => {
                let arrivals = self.arrivals.lock().unwrap();
                match arrivals.first() {
                    Some((_, buffer)) => buffer.clone(),
                    None => fault!(
                        "no buffer had arrived on input {}:{}",
                        parent.name(),
                        self.name
                    ),
                }
            }
            _ => self.mix_arrivals(&parent),
        }
    }

    fn mix_arrivals(&self, parent: &Arc<Node>) -> Arc<Buffer> {
        let arrivals = self.arrivals.lock().unwrap();
        log::trace!(
            "mixing {} buffers for {}:{}",
            arrivals.len(),
            parent.name(),
            self.name
        );

        let mix = self
            .mix_buffer
            .lock()
            .unwrap()
            .get_or_insert_with(|| Arc::new(Buffer::owned(parent.core().buffer_size())))
            .clone();
        mix.zero();
        for (_, buffer) in arrivals.iter() {
            mix.mix(buffer);
        }
        mix
    }
}

/// An output channel on a node.
pub struct Output {
    name: EcoString,
    parent: Weak<Node>,
    links: Mutex<SmallVec<[Arc<Link>; 4]>>,
    /// Outputs on forwarder nodes this output cascades its buffer to.
    forwards: Mutex<SmallVec<[Arc<Output>; 4]>>,
    buffer: Mutex<Option<Arc<Buffer>>>,
}

impl Output {
    pub(crate) fn new(name: EcoString, parent: Weak<Node>) -> Arc<Output> {
        Arc::new(Output {
            name,
            parent,
            links: Mutex::new(SmallVec::new()),
            forwards: Mutex::new(SmallVec::new()),
            buffer: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }

    pub fn parent(&self) -> Arc<Node> {
        match self.parent.upgrade() {
            Some(node) => node,
            None => fault!("output {} has no parent node", self.name),
        }
    }

    pub(crate) fn register_link(&self, link: Arc<Link>) {
        self.links.lock().unwrap().push(link);
    }

    #[cfg(test)]
    pub(crate) fn links(&self) -> SmallVec<[Arc<Link>; 4]> {
        self.links.lock().unwrap().clone()
    }

    /// Link this output to an input on another node.
    pub fn link_to(self: &Arc<Self>, to: &Arc<Input>) {
        link_channels(self, to);
    }

    /// Forward this output through to an output on an enclosing forwarder
    /// node.
    pub fn forward_to(self: &Arc<Self>, to: &Arc<Output>) {
        let parent = self.parent();
        if parent.is_forwarder() {
            fault!(
                "node to forward output from is a forwarder: {}",
                parent.name()
            );
        }
        let to_parent = to.parent();
        if !to_parent.is_forwarder() {
            fault!(
                "node to forward output to is not a forwarder: {}:{} -> {}:{}",
                parent.name(),
                self.name,
                to_parent.name(),
                to.name
            );
        }
        self.forwards.lock().unwrap().push(to.clone());
    }

    /// Install a fresh buffer for the cycle about to run.
    pub fn init_cycle(&self) {
        log::trace!("starting cycle for output {}", self.name);
        let size = self.parent().core().buffer_size();
        *self.buffer.lock().unwrap() = Some(Arc::new(Buffer::owned(size)));
    }

    /// Drop the cycle's buffer.
    pub fn reset_cycle(&self) {
        log::trace!("ending cycle for output {}", self.name);
        *self.buffer.lock().unwrap() = None;
    }

    /// The buffer for the running cycle.
    pub fn get_buffer(&self) -> Arc<Buffer> {
        match self.buffer.lock().unwrap().as_ref() {
            Some(buffer) => buffer.clone(),
            None => fault!(
                "output buffer was not set for {}:{}",
                self.parent().name(),
                self.name
            ),
        }
    }

    /// Replace the cycle's buffer and immediately notify downstream. Used
    /// by IO nodes to publish a driver's buffer into the graph.
    pub fn set_buffer(&self, buffer: Arc<Buffer>) {
        *self.buffer.lock().unwrap() = Some(buffer);
        self.notify();
    }

    /// Publish the cycle's buffer: cascade through forwards, then notify
    /// every link.
    pub fn notify(&self) {
        let buffer = match self.buffer.lock().unwrap().as_ref() {
            Some(buffer) => buffer.clone(),
            None => fault!(
                "buffer was not set while notifying {}:{}",
                self.parent().name(),
                self.name
            ),
        };

        let forwards: SmallVec<[Arc<Output>; 4]> = self.forwards.lock().unwrap().clone();
        for forward in forwards {
            forward.set_buffer(buffer.clone());
        }

        let links: SmallVec<[Arc<Link>; 4]> = self.links.lock().unwrap().clone();
        for link in links {
            link.notify(&buffer, true);
        }
    }
}

/// One-directional edge from an output to an input, carrying one buffer per
/// cycle.
///
/// `available == true` means the link's slot is empty and the producer may
/// fill it. The flag transitions to `false` on [`notify`](Link::notify) and
/// back on [`reset`](Link::reset); a producer that outruns its consumer
/// within a cycle blocks here, which is what bounds the engine to one block
/// in flight per link.
pub struct Link {
    id: u64,
    to: Weak<Input>,
    available: Mutex<bool>,
    available_condition: Condvar,
}

impl Link {
    fn new(to: &Arc<Input>) -> Arc<Link> {
        Arc::new(Link {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            to: Arc::downgrade(to),
            available: Mutex::new(true),
            available_condition: Condvar::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver a buffer to the consuming input.
    ///
    /// With `blocking`, a still-occupied slot parks the caller until the
    /// consumer resets the link. Without it, a second notify before a reset
    /// is a protocol bug and fatal.
    pub fn notify(&self, buffer: &Arc<Buffer>, blocking: bool) {
        let mut available = self.available.lock().unwrap();

        if !*available {
            if blocking {
                log::trace!("producer is blocked on link {}", self.id);
                while !*available {
                    available = self.available_condition.wait(available).unwrap();
                }
            } else {
                fault!("attempt to set link {} ready when it was already ready", self.id);
            }
        }

        *available = false;
        drop(available);

        match self.to.upgrade() {
            Some(to) => to.link_ready(self.id, buffer),
            None => fault!("link {} has no consumer", self.id),
        }
    }

    /// Empty the slot and wake any blocked producer.
    pub fn reset(&self) {
        log::trace!("resetting link {}", self.id);
        let mut available = self.available.lock().unwrap();
        *available = true;
        self.available_condition.notify_all();
    }
}

/// Create a link between two channels and register it on both endpoints.
fn link_channels(from: &Arc<Output>, to: &Arc<Input>) {
    let from_parent = from.parent();
    let to_parent = to.parent();
    if !Arc::ptr_eq(from_parent.core(), to_parent.core()) {
        fault!(
            "attempt to link channels across domains: {}:{} -> {}:{}",
            from_parent.name(),
            from.name(),
            to_parent.name(),
            to.name()
        );
    }

    let link = Link::new(to);
    from.register_link(link.clone());
    to.register_link(link);
}
