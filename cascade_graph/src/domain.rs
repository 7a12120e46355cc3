//! Domains own the graph and the worker pool that executes it.
//!
//! A [`Domain`] is a sample-rate + block-size execution environment. The
//! state shared with nodes and workers lives in [`DomainCore`]: the run
//! queue, the zero buffer and the domain parameters. [`Domain`] itself owns
//! the node list and the worker join handles, so there is no ownership cycle
//! between nodes and their domain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use cascade_primitives::Buffer;
use ecow::EcoString;

use crate::fault;
use crate::io::IoBridge;
use crate::node::{Node, NodeKind};
use crate::plugin::{FilterHost, Plugin};
use crate::property::PropertyValue;

/// Default driver deadline for IO nodes, in milliseconds
/// (`config:watchdog_ms`).
pub const DEFAULT_WATCHDOG_MS: u64 = 1500;

/// The part of a domain shared with its nodes and workers.
pub struct DomainCore {
    name: EcoString,
    sample_rate: u32,
    buffer_size: usize,
    zero_buffer: Arc<Buffer>,
    run_queue: Mutex<VecDeque<Arc<Node>>>,
    run_queue_condition: Condvar,
    activated: AtomicBool,
}

impl DomainCore {
    pub fn name(&self) -> &EcoString {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The read-only buffer of silence handed to inputs with no arrivals.
    pub fn zero_buffer(&self) -> &Arc<Buffer> {
        &self.zero_buffer
    }

    /// Enqueue a node whose inputs are all satisfied. FIFO admission order;
    /// topology order emerges from the readiness protocol, not the queue.
    pub(crate) fn add_ready_node(&self, node: Arc<Node>) {
        log::trace!("adding ready node: {}", node.name());

        if !self.activated.load(Ordering::Acquire) {
            fault!(
                "node {} became ready before domain {} was activated",
                node.name(),
                self.name
            );
        }

        let mut queue = self.run_queue.lock().unwrap();
        queue.push_back(node);
        self.run_queue_condition.notify_one();
    }

    fn be_worker(self: Arc<Self>) {
        loop {
            let node = {
                let mut queue = self.run_queue.lock().unwrap();
                loop {
                    match queue.pop_front() {
                        Some(node) => break node,
                        None => queue = self.run_queue_condition.wait(queue).unwrap(),
                    }
                }
            };

            log::trace!("running node: {}", node.name());
            node.execute();
            log::trace!("done running node: {}", node.name());
        }
    }
}

/// A scheduling context with a fixed sample rate and block size, owning its
/// nodes and worker threads.
pub struct Domain {
    core: Arc<DomainCore>,
    nodes: Vec<Arc<Node>>,
    workers: Vec<JoinHandle<()>>,
}

impl Domain {
    pub fn new(name: &str, sample_rate: u32, buffer_size: usize) -> Domain {
        if sample_rate == 0 {
            fault!("attempt to create a domain with a zero sample rate");
        }
        if buffer_size == 0 {
            fault!("attempt to create a domain with a zero buffer size");
        }
        Domain {
            core: Arc::new(DomainCore {
                name: EcoString::from(name),
                sample_rate,
                buffer_size,
                zero_buffer: Arc::new(Buffer::owned(buffer_size)),
                run_queue: Mutex::new(VecDeque::new()),
                run_queue_condition: Condvar::new(),
                activated: AtomicBool::new(false),
            }),
            nodes: Vec::new(),
            workers: Vec::new(),
        }
    }

    pub fn core(&self) -> &Arc<DomainCore> {
        &self.core
    }

    pub fn name(&self) -> &EcoString {
        self.core.name()
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.sample_rate()
    }

    pub fn buffer_size(&self) -> usize {
        self.core.buffer_size()
    }

    pub fn zero_buffer(&self) -> &Arc<Buffer> {
        self.core.zero_buffer()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Find a node by name; unknown names are fatal.
    pub fn node(&self, name: &str) -> Arc<Node> {
        match self.nodes.iter().find(|node| node.name() == name) {
            Some(node) => node.clone(),
            None => fault!("no node named {name} in domain {}", self.core.name),
        }
    }

    /// Create a filter node hosting `plugin`. The plugin's port table
    /// becomes the node's channels and control properties.
    pub fn add_filter(&mut self, name: &str, plugin: Box<dyn Plugin>) -> Arc<Node> {
        let node = Node::new(
            name,
            "cascade::filter",
            self.core.clone(),
            NodeKind::Filter(Mutex::new(FilterHost::new(plugin))),
        );
        if let NodeKind::Filter(host) = &node.kind {
            host.lock().unwrap().init(&node);
        }
        self.add_node(node)
    }

    /// Create an IO node. Its channels are added by the caller to mirror the
    /// driver's ports.
    pub fn add_io(&mut self, name: &str) -> Arc<Node> {
        let node = Node::new(
            name,
            "cascade::io",
            self.core.clone(),
            NodeKind::Io(IoBridge::new()),
        );
        node.add_property_value(
            "config:watchdog_ms",
            PropertyValue::Size(DEFAULT_WATCHDOG_MS),
        );
        self.add_node(node)
    }

    /// Create a chain: a named forwarder grouping whose channels are wired
    /// through to interior nodes with forwards.
    pub fn add_chain(&mut self, name: &str) -> Arc<Node> {
        let node = Node::new(name, "cascade::chain", self.core.clone(), NodeKind::Forwarder);
        self.add_node(node)
    }

    fn add_node(&mut self, node: Arc<Node>) -> Arc<Node> {
        // The topology is fixed once the domain runs; workers and drivers
        // assume the node list no longer changes.
        if self.core.activated.load(Ordering::Acquire) {
            fault!(
                "attempt to add node {} to domain {} after activation",
                node.name(),
                self.core.name
            );
        }
        self.nodes.push(node.clone());
        node
    }

    /// Activate every node in insertion order, then spawn `num_workers`
    /// worker threads. One-shot; drivers may start producing afterwards.
    pub fn activate(&mut self, num_workers: usize) {
        if num_workers == 0 {
            fault!("attempt to activate a domain with an invalid number of threads");
        }
        if self.core.activated.swap(true, Ordering::AcqRel) {
            fault!("domain {} is already activated", self.core.name);
        }

        // Nodes are activated before any worker exists to run them so a
        // node cannot be executed from the ready queue before it is armed.
        for node in &self.nodes {
            node.activate();
        }

        for i in 0..num_workers {
            let core = self.core.clone();
            let worker = std::thread::Builder::new()
                .name(format!("{}-worker-{i}", self.core.name))
                .spawn(move || core.be_worker())
                .unwrap_or_else(|e| fault!("could not spawn worker thread: {e}"));
            self.workers.push(worker);
        }
    }

    pub fn is_activated(&self) -> bool {
        self.core.activated.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
