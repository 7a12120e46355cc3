//! The plugin runtime contract and the filter host that drives it.
//!
//! A plugin exposes a flat port table: audio ports carry one block of
//! samples per cycle, control ports carry a single value. The host connects
//! every audio port to the corresponding channel buffer before each run and
//! disconnects after; control ports are connected once, at init, to slots
//! the host owns and syncs with the node's `config:`/`state:` properties.
//! Loading plugins from shared objects is an external concern; anything
//! implementing [`Plugin`] can be hosted.

use std::sync::Arc;

use cascade_primitives::Buffer;
use ecow::EcoString;
use smallvec::SmallVec;

use crate::Sample;
use crate::node::Node;
use crate::property::PropertyValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortClass {
    Audio,
    Control,
}

#[derive(Clone, Copy, Debug)]
pub struct PortDescriptor {
    pub class: PortClass,
    pub direction: PortDirection,
}

impl PortDescriptor {
    pub const AUDIO_IN: PortDescriptor = PortDescriptor {
        class: PortClass::Audio,
        direction: PortDirection::Input,
    };
    pub const AUDIO_OUT: PortDescriptor = PortDescriptor {
        class: PortClass::Audio,
        direction: PortDirection::Output,
    };
    pub const CONTROL_IN: PortDescriptor = PortDescriptor {
        class: PortClass::Control,
        direction: PortDirection::Input,
    };
    pub const CONTROL_OUT: PortDescriptor = PortDescriptor {
        class: PortClass::Control,
        direction: PortDirection::Output,
    };
}

/// How a control port's default value is derived from its bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PortDefault {
    /// No default hint; the host uses 0.
    #[default]
    None,
    Minimum,
    /// Between minimum and middle; geometric when logarithmic.
    Low,
    Middle,
    /// Between middle and maximum; geometric when logarithmic.
    High,
    Maximum,
    Zero,
    One,
    Hundred,
    A440,
}

/// Hint metadata for one control port.
#[derive(Clone, Copy, Debug)]
pub struct PortHint {
    pub default: PortDefault,
    pub lower_bound: Sample,
    pub upper_bound: Sample,
    pub logarithmic: bool,
}

impl Default for PortHint {
    fn default() -> Self {
        PortHint {
            default: PortDefault::None,
            lower_bound: 0.0,
            upper_bound: 1.0,
            logarithmic: false,
        }
    }
}

impl PortHint {
    pub fn bounded(default: PortDefault, lower_bound: Sample, upper_bound: Sample) -> PortHint {
        PortHint {
            default,
            lower_bound,
            upper_bound,
            logarithmic: false,
        }
    }

    pub fn logarithmic(mut self) -> PortHint {
        self.logarithmic = true;
        self
    }
}

/// Derive a control port's default value from its hint.
pub fn control_port_default(hint: &PortHint) -> Sample {
    let low = hint.lower_bound;
    let high = hint.upper_bound;
    match hint.default {
        PortDefault::None | PortDefault::Zero => 0.0,
        PortDefault::One => 1.0,
        PortDefault::Hundred => 100.0,
        PortDefault::A440 => 440.0,
        PortDefault::Minimum => low,
        PortDefault::Maximum => high,
        PortDefault::Low => {
            if hint.logarithmic {
                (low.ln() * 0.75 + high.ln() * 0.25).exp()
            } else {
                low * 0.75 + high * 0.25
            }
        }
        PortDefault::Middle => {
            if hint.logarithmic {
                (low.ln() * 0.5 + high.ln() * 0.5).exp()
            } else {
                low * 0.5 + high * 0.5
            }
        }
        PortDefault::High => {
            if hint.logarithmic {
                (low.ln() * 0.25 + high.ln() * 0.75).exp()
            } else {
                low * 0.25 + high * 0.75
            }
        }
    }
}

/// The runtime contract a hosted plugin implements.
///
/// `connect` installs the data pointer for a port; a null pointer
/// disconnects it. Pointers stay valid until disconnected or replaced.
/// During `run` the plugin reads its connected input ports and writes its
/// connected output ports for `frames` samples.
pub trait Plugin: Send {
    fn port_count(&self) -> usize;
    fn port_descriptor(&self, port: usize) -> PortDescriptor;
    fn port_name(&self, port: usize) -> &str;
    fn port_hint(&self, _port: usize) -> PortHint {
        PortHint::default()
    }
    fn activate(&mut self) {}
    fn connect(&mut self, port: usize, data: *mut Sample);
    fn run(&mut self, frames: usize);
}

/// Hosts one [`Plugin`] inside a filter node: builds the node's channels and
/// control properties from the plugin's port table and wires buffers to the
/// ports around each run.
pub(crate) struct FilterHost {
    plugin: Box<dyn Plugin>,
    audio_inputs: Vec<(usize, EcoString)>,
    audio_outputs: Vec<(usize, EcoString)>,
    /// Control input ports and the `config:` property backing each.
    control_inputs: Vec<(usize, EcoString)>,
    /// Control output ports and the `state:` property each publishes to.
    control_outputs: Vec<(usize, EcoString)>,
    /// One slot per port; control ports stay connected to these.
    control_values: Box<[Sample]>,
}

impl FilterHost {
    pub(crate) fn new(plugin: Box<dyn Plugin>) -> FilterHost {
        FilterHost {
            plugin,
            audio_inputs: Vec::new(),
            audio_outputs: Vec::new(),
            control_inputs: Vec::new(),
            control_outputs: Vec::new(),
            control_values: Box::new([]),
        }
    }

    /// Walk the plugin's port table: audio ports become channels on `node`,
    /// control ports become `config:`/`state:` properties initialised from
    /// the plugin's hints.
    pub(crate) fn init(&mut self, node: &Arc<Node>) {
        let count = self.plugin.port_count();
        self.control_values = vec![0.0; count].into_boxed_slice();

        for port in 0..count {
            let descriptor = self.plugin.port_descriptor(port);
            let name = EcoString::from(self.plugin.port_name(port));
            match descriptor.class {
                PortClass::Audio => match descriptor.direction {
                    PortDirection::Input => {
                        node.add_input(&name);
                        self.audio_inputs.push((port, name));
                    }
                    PortDirection::Output => {
                        node.add_output(&name);
                        self.audio_outputs.push((port, name));
                    }
                },
                PortClass::Control => {
                    let default = control_port_default(&self.plugin.port_hint(port));
                    let property = match descriptor.direction {
                        PortDirection::Input => EcoString::from(format!("config:{name}")),
                        PortDirection::Output => EcoString::from(format!("state:{name}")),
                    };
                    node.add_property_value(&property, PropertyValue::Real(default));
                    self.control_values[port] = default;
                    // The slot address is stable: control_values is never
                    // reallocated after this point.
                    let slot: *mut Sample = &mut self.control_values[port];
                    self.plugin.connect(port, slot);
                    match descriptor.direction {
                        PortDirection::Input => self.control_inputs.push((port, property)),
                        PortDirection::Output => self.control_outputs.push((port, property)),
                    }
                }
            }
        }
    }

    pub(crate) fn activate(&mut self) {
        self.plugin.activate();
    }

    /// One block: refresh control inputs from `config:` properties, connect
    /// the cycle's channel buffers, run the plugin, disconnect, publish
    /// control outputs to `state:` properties.
    pub(crate) fn run(&mut self, node: &Arc<Node>) {
        log::trace!("running plugin for node {}", node.name());

        for (port, property) in &self.control_inputs {
            self.control_values[*port] = node.property_real(property);
        }

        // Keep the cycle's buffers alive until the ports are disconnected.
        let mut connected: SmallVec<[Arc<Buffer>; 8]> = SmallVec::new();
        for (port, channel) in &self.audio_inputs {
            let buffer = node.component().get_input(channel).get_buffer();
            self.plugin.connect(*port, buffer.as_ptr());
            connected.push(buffer);
        }
        for (port, channel) in &self.audio_outputs {
            let buffer = node.component().get_output(channel).get_buffer();
            self.plugin.connect(*port, buffer.as_ptr());
            connected.push(buffer);
        }

        self.plugin.run(node.core().buffer_size());

        for (port, _) in self.audio_inputs.iter().chain(self.audio_outputs.iter()) {
            self.plugin.connect(*port, core::ptr::null_mut());
        }
        drop(connected);

        for (port, property) in &self.control_outputs {
            node.set_property_real(property, self.control_values[*port]);
        }

        log::trace!("done running plugin for node {}", node.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_defaults() {
        assert_eq!(control_port_default(&PortHint::default()), 0.0);
        let mut hint = PortHint::default();
        hint.default = PortDefault::One;
        assert_eq!(control_port_default(&hint), 1.0);
        hint.default = PortDefault::Hundred;
        assert_eq!(control_port_default(&hint), 100.0);
        hint.default = PortDefault::A440;
        assert_eq!(control_port_default(&hint), 440.0);
    }

    #[test]
    fn bound_defaults() {
        let hint = PortHint::bounded(PortDefault::Minimum, 2.0, 10.0);
        assert_eq!(control_port_default(&hint), 2.0);
        let hint = PortHint::bounded(PortDefault::Maximum, 2.0, 10.0);
        assert_eq!(control_port_default(&hint), 10.0);
        let hint = PortHint::bounded(PortDefault::Middle, 2.0, 10.0);
        assert_eq!(control_port_default(&hint), 6.0);
        let hint = PortHint::bounded(PortDefault::Low, 0.0, 100.0);
        assert_eq!(control_port_default(&hint), 25.0);
        let hint = PortHint::bounded(PortDefault::High, 0.0, 100.0);
        assert_eq!(control_port_default(&hint), 75.0);
    }

    #[test]
    fn logarithmic_defaults_interpolate_geometrically() {
        let hint = PortHint::bounded(PortDefault::Middle, 1.0, 100.0).logarithmic();
        let mid = control_port_default(&hint);
        assert!((mid - 10.0).abs() < 1e-4);

        let hint = PortHint::bounded(PortDefault::Low, 1.0, 10000.0).logarithmic();
        let low = control_port_default(&hint);
        assert!((low - 10.0).abs() < 1e-2);
    }
}
