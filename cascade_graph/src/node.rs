//! Graph nodes: filters hosting plugins, IO nodes driven by external
//! callbacks, and forwarders (chains) whose channels pass straight through.
//!
//! Node lifecycle:
//!
//! ```text
//! construct -> activate
//!
//! filter cycle:            forwarder cycle:        io cycle:
//!   inputs satisfied         inputs satisfied        driver publishes outputs
//!     init_cycle               init_cycle            inputs satisfied
//!     enqueue                  reset_cycle             copy to driver, unpark
//!   execute (worker)                                   reset_cycle
//!     run / notify / reset
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ecow::EcoString;

use crate::channel::{Input, Output};
use crate::component::Component;
use crate::domain::DomainCore;
use crate::fault;
use crate::io::IoBridge;
use crate::plugin::FilterHost;
use crate::property::{PropertyKind, PropertyValue, fully_qualify};
use crate::Sample;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a node does when it becomes ready, encoded as a tag so the illegal
/// operations (executing or notifying a forwarder) stay unrepresentable at
/// the call sites that dispatch on it.
pub(crate) enum NodeKind {
    /// Runs a plugin on a worker thread once all inputs are satisfied.
    Filter(Mutex<FilterHost>),
    /// Driven by an external realtime callback, not the run queue.
    Io(IoBridge),
    /// Owns no DSP; channels are bridged through by forwards. A *chain* is a
    /// named forwarder grouping.
    Forwarder,
}

/// A node in a domain's processing graph.
pub struct Node {
    id: u64,
    name: EcoString,
    core: Arc<DomainCore>,
    pub(crate) kind: NodeKind,
    component: Component,
    properties: Mutex<BTreeMap<EcoString, PropertyValue>>,
    /// Serialises `execute` against the driver callback.
    pub(crate) node_mutex: Mutex<()>,
}

impl Node {
    pub(crate) fn new(
        name: &str,
        class: &str,
        core: Arc<DomainCore>,
        kind: NodeKind,
    ) -> Arc<Node> {
        let domain_name = core.name().clone();
        let node = Arc::new_cyclic(|weak| Node {
            id: next_node_id(),
            name: EcoString::from(name),
            core,
            kind,
            component: Component::new(weak.clone()),
            properties: Mutex::new(BTreeMap::new()),
            node_mutex: Mutex::new(()),
        });
        node.add_property_value("node:name", PropertyValue::String(EcoString::from(name)));
        node.add_property_value("node:domain", PropertyValue::String(domain_name));
        node.add_property_value("node:class", PropertyValue::String(EcoString::from(class)));
        node
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }

    pub fn core(&self) -> &Arc<DomainCore> {
        &self.core
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn is_forwarder(&self) -> bool {
        matches!(self.kind, NodeKind::Forwarder)
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind, NodeKind::Io(_))
    }

    pub fn add_input(&self, name: &str) -> Arc<Input> {
        self.component.add_input(name)
    }

    pub fn add_output(&self, name: &str) -> Arc<Output> {
        self.component.add_output(name)
    }

    pub fn input(&self, name: &str) -> Arc<Input> {
        self.component.get_input(name)
    }

    pub fn output(&self, name: &str) -> Arc<Output> {
        self.component.get_output(name)
    }

    /// Link `output_name` on this node to `input_name` on `other`. Either
    /// name may be `"*"` to mean every channel on that side.
    pub fn connect(&self, output_name: &str, other: &Arc<Node>, input_name: &str) {
        if output_name == "*" {
            for name in self.component.output_names() {
                assert!(name != "*");
                self.connect(&name, other, input_name);
            }
        } else if input_name == "*" {
            for name in other.component().input_names() {
                assert!(name != "*");
                self.connect(output_name, other, &name);
            }
        } else {
            self.output(output_name).link_to(&other.input(input_name));
        }
    }

    /// One-time transition into the running state: activate the plugin for
    /// filters, then arm the first cycle.
    pub fn activate(self: &Arc<Self>) {
        log::debug!("activating node {}", self.name);
        if let NodeKind::Filter(host) = &self.kind {
            host.lock().unwrap().activate();
        }
        self.reset_cycle();
    }

    /// Called when the node's inputs are all satisfied.
    pub fn will_run(self: &Arc<Self>) {
        match &self.kind {
            NodeKind::Filter(_) => {
                self.init_cycle();
                self.core.add_ready_node(self.clone());
            }
            NodeKind::Io(_) => self.io_release(),
            NodeKind::Forwarder => {
                // A forwarder uses no CPU since all channels are forwarded,
                // but a full cycle still has to happen so the run queue can
                // be skipped.
                let _guard = self.node_mutex.lock().unwrap();
                self.init_cycle();
                self.reset_cycle();
            }
        }
    }

    /// Worker entry point, taken from the run queue.
    pub fn execute(self: &Arc<Self>) {
        match &self.kind {
            NodeKind::Filter(host) => {
                let _guard = self.node_mutex.lock().unwrap();
                host.lock().unwrap().run(self);
                self.notify();
                self.reset_cycle();
            }
            NodeKind::Io(_) => {
                // IO nodes run from their driver callback, never the queue.
                log::trace!("execute is a no-op for io node {}", self.name);
            }
            NodeKind::Forwarder => {
                fault!("forwarder node {} should never try to execute", self.name)
            }
        }
    }

    /// Publish every output downstream.
    pub fn notify(&self) {
        match &self.kind {
            NodeKind::Forwarder => {
                fault!("forwarder node {} should never try to notify", self.name)
            }
            _ => self.component.notify(),
        }
    }

    pub fn init_cycle(&self) {
        log::trace!("initializing cycle for node {}", self.name);
        self.component.init_cycle();
    }

    pub fn reset_cycle(&self) {
        self.component.reset_cycle();
    }

    pub fn is_ready(&self) -> bool {
        self.component.is_ready()
    }

    // ---- properties ----

    /// Create a property with the kind's default value.
    pub fn add_property(&self, name: &str, kind: PropertyKind) {
        self.add_property_value(name, PropertyValue::default_for(kind));
    }

    /// Create a property with an initial value.
    pub fn add_property_value(&self, name: &str, value: PropertyValue) {
        let mut properties = self.properties.lock().unwrap();
        if properties.contains_key(name) {
            fault!("attempt to add duplicate property {name} to node {}", self.name);
        }
        properties.insert(EcoString::from(name), value);
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.lock().unwrap().contains_key(name)
    }

    pub fn property_names(&self) -> Vec<EcoString> {
        self.properties.lock().unwrap().keys().cloned().collect()
    }

    fn with_property<R>(&self, name: &str, f: impl FnOnce(&mut PropertyValue) -> R) -> R {
        let mut properties = self.properties.lock().unwrap();
        match properties.get_mut(name) {
            Some(value) => f(value),
            None => fault!("no property existed with name {name} on node {}", self.name),
        }
    }

    /// Stringify a property, coercing unqualified names to `config:`.
    ///
    /// Takes the node mutex so external readers observe values from between
    /// cycles; do not call from a plugin `run`.
    pub fn peek(&self, name: &str) -> String {
        let _guard = self.node_mutex.lock().unwrap();
        self.with_property(&fully_qualify(name), |value| value.get())
    }

    /// Parse a string into a property, coercing unqualified names to
    /// `config:`. Same locking as [`peek`](Node::peek).
    pub fn poke(&self, name: &str, value: &str) {
        let _guard = self.node_mutex.lock().unwrap();
        self.with_property(&fully_qualify(name), |property| {
            property.set_from_str(value)
        });
    }

    pub fn property_kind(&self, name: &str) -> PropertyKind {
        self.with_property(name, |value| value.kind())
    }

    pub fn property_size(&self, name: &str) -> u64 {
        self.with_property(name, |value| value.as_size())
    }

    pub fn property_integer(&self, name: &str) -> i64 {
        self.with_property(name, |value| value.as_integer())
    }

    pub fn property_real(&self, name: &str) -> Sample {
        self.with_property(name, |value| value.as_real())
    }

    pub fn property_string(&self, name: &str) -> EcoString {
        self.with_property(name, |value| value.as_string())
    }

    pub fn set_property_size(&self, name: &str, value: u64) {
        self.with_property(name, |property| property.set_size(value));
    }

    pub fn set_property_integer(&self, name: &str, value: i64) {
        self.with_property(name, |property| property.set_integer(value));
    }

    pub fn set_property_real(&self, name: &str, value: Sample) {
        self.with_property(name, |property| property.set_real(value));
    }

    pub fn set_property_string(&self, name: &str, value: &str) {
        self.with_property(name, |property| property.set_string(value));
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
