//! The per-node aggregate of audio channels and node-level arrival
//! accounting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use ecow::EcoString;

use crate::channel::{Input, Output, SANITY_WAITING_LIMIT};
use crate::fault;
use crate::node::Node;
use crate::property::PropertyValue;

/// A node's audio channels plus the count of inputs still waiting for
/// arrivals this cycle. When the count reaches zero the node is ready and
/// [`Node::will_run`] fires.
pub struct Component {
    parent: Weak<Node>,
    inputs: Mutex<BTreeMap<EcoString, Arc<Input>>>,
    outputs: Mutex<BTreeMap<EcoString, Arc<Output>>>,
    inputs_waiting: AtomicUsize,
}

impl Component {
    pub(crate) fn new(parent: Weak<Node>) -> Component {
        Component {
            parent,
            inputs: Mutex::new(BTreeMap::new()),
            outputs: Mutex::new(BTreeMap::new()),
            inputs_waiting: AtomicUsize::new(0),
        }
    }

    fn parent(&self) -> Arc<Node> {
        match self.parent.upgrade() {
            Some(node) => node,
            None => fault!("audio component has no parent node"),
        }
    }

    pub fn add_input(&self, name: &str) -> Arc<Input> {
        let parent = self.parent();
        let mut inputs = self.inputs.lock().unwrap();
        if inputs.contains_key(name) {
            fault!("attempt to add duplicate input name: {name}");
        }
        let input = Input::new(EcoString::from(name), self.parent.clone());
        inputs.insert(input.name().clone(), input.clone());
        drop(inputs);

        parent.add_property_value(
            &format!("input:{name}"),
            PropertyValue::String(EcoString::from("audio")),
        );
        input
    }

    pub fn add_output(&self, name: &str) -> Arc<Output> {
        let parent = self.parent();
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.contains_key(name) {
            fault!("attempt to add duplicate output name: {name}");
        }
        let output = Output::new(EcoString::from(name), self.parent.clone());
        outputs.insert(output.name().clone(), output.clone());
        drop(outputs);

        parent.add_property_value(
            &format!("output:{name}"),
            PropertyValue::String(EcoString::from("audio")),
        );
        output
    }

    pub fn get_input(&self, name: &str) -> Arc<Input> {
        match self.inputs.lock().unwrap().get(name) {
            Some(input) => input.clone(),
            None => fault!(
                "could not find input channel named {name} for node {}",
                self.parent().name()
            ),
        }
    }

    pub fn get_output(&self, name: &str) -> Arc<Output> {
        match self.outputs.lock().unwrap().get(name) {
            Some(output) => output.clone(),
            None => fault!(
                "could not find output channel named {name} for node {}",
                self.parent().name()
            ),
        }
    }

    pub fn input_names(&self) -> Vec<EcoString> {
        self.inputs.lock().unwrap().keys().cloned().collect()
    }

    pub fn output_names(&self) -> Vec<EcoString> {
        self.outputs.lock().unwrap().keys().cloned().collect()
    }

    pub fn inputs_waiting(&self) -> usize {
        self.inputs_waiting.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.inputs_waiting() == 0
    }

    /// Start a cycle: give every output a fresh buffer. Inputs need no
    /// per-cycle setup; their arrivals accumulate from the reset onwards.
    pub fn init_cycle(&self) {
        log::trace!("audio component is starting cycle for node {}", self.parent().name());
        let outputs: Vec<Arc<Output>> = self.outputs.lock().unwrap().values().cloned().collect();
        for output in outputs {
            output.init_cycle();
        }
    }

    /// End a cycle and re-arm for the next one.
    ///
    /// The node-level counter is armed from the static wiring before any
    /// input opens its links: a producer woken by an input reset may drive
    /// that input to zero and call [`source_ready`](Component::source_ready)
    /// before this function returns, so the counter must already hold its
    /// final value.
    pub fn reset_cycle(&self) {
        log::trace!("audio component is ending cycle for node {}", self.parent().name());

        let outputs: Vec<Arc<Output>> = self.outputs.lock().unwrap().values().cloned().collect();
        for output in outputs {
            output.reset_cycle();
        }

        let inputs: Vec<Arc<Input>> = self.inputs.lock().unwrap().values().cloned().collect();
        let inputs_with_links = inputs.iter().filter(|input| input.fan_in() > 0).count();
        self.inputs_waiting.store(inputs_with_links, Ordering::Release);

        for input in inputs {
            input.reset_cycle();
        }
    }

    /// Publish every output downstream.
    pub fn notify(&self) {
        let outputs: Vec<Arc<Output>> = self.outputs.lock().unwrap().values().cloned().collect();
        for output in outputs {
            output.notify();
        }
    }

    /// One of our inputs has all of its arrivals.
    pub fn source_ready(&self, input: &Input) {
        let parent = self.parent();
        let now_waiting = self.inputs_waiting.fetch_sub(1, Ordering::AcqRel) - 1;
        log::trace!(
            "node {} audio sources now waiting: {now_waiting} (input {} satisfied)",
            parent.name(),
            input.name()
        );

        if now_waiting > SANITY_WAITING_LIMIT {
            fault!(
                "sanity check failed: inputs now waiting is {now_waiting} for node {}",
                parent.name()
            );
        }

        if now_waiting == 0 {
            assert!(parent.is_ready());
            parent.will_run();
        }
    }
}
