//! Built-in plugins exercising the [`Plugin`] contract.

use crate::Sample;
use crate::fault;
use crate::plugin::{Plugin, PortDefault, PortDescriptor, PortHint};

/// Multiply the input block by the `gain` control.
pub struct Gain {
    ports: [*mut Sample; 3],
}

// Safety: the connected pointers are channel buffers and a host-owned
// control slot, both guaranteed valid while connected; see the Plugin
// contract.
unsafe impl Send for Gain {}

impl Gain {
    pub const PORT_IN: usize = 0;
    pub const PORT_OUT: usize = 1;
    pub const PORT_GAIN: usize = 2;

    pub fn new() -> Gain {
        Gain {
            ports: [core::ptr::null_mut(); 3],
        }
    }
}

impl Plugin for Gain {
    fn port_count(&self) -> usize {
        3
    }

    fn port_descriptor(&self, port: usize) -> PortDescriptor {
        match port {
            Self::PORT_IN => PortDescriptor::AUDIO_IN,
            Self::PORT_OUT => PortDescriptor::AUDIO_OUT,
            Self::PORT_GAIN => PortDescriptor::CONTROL_IN,
            _ => fault!("gain plugin has no port {port}"),
        }
    }

    fn port_name(&self, port: usize) -> &str {
        match port {
            Self::PORT_IN => "in",
            Self::PORT_OUT => "out",
            Self::PORT_GAIN => "gain",
            _ => fault!("gain plugin has no port {port}"),
        }
    }

    fn port_hint(&self, port: usize) -> PortHint {
        match port {
            Self::PORT_GAIN => PortHint::bounded(PortDefault::One, 0.0, 4.0),
            _ => PortHint::default(),
        }
    }

    fn connect(&mut self, port: usize, data: *mut Sample) {
        match self.ports.get_mut(port) {
            Some(slot) => *slot = data,
            None => fault!("attempt to connect unknown gain plugin port {port}"),
        }
    }

    fn run(&mut self, frames: usize) {
        let [input, output, gain] = self.ports;
        if input.is_null() || output.is_null() || gain.is_null() {
            fault!("gain plugin ran with disconnected ports");
        }
        // Safety: connected pointers are valid for `frames` samples per the
        // Plugin contract.
        unsafe {
            let gain = *gain;
            for i in 0..frames {
                *output.add(i) = *input.add(i) * gain;
            }
        }
    }
}

/// Copy the input block to the output unchanged.
pub struct Passthrough {
    ports: [*mut Sample; 2],
}

// Safety: as for [`Gain`].
unsafe impl Send for Passthrough {}

impl Passthrough {
    pub const PORT_IN: usize = 0;
    pub const PORT_OUT: usize = 1;

    pub fn new() -> Passthrough {
        Passthrough {
            ports: [core::ptr::null_mut(); 2],
        }
    }
}

impl Plugin for Passthrough {
    fn port_count(&self) -> usize {
        2
    }

    fn port_descriptor(&self, port: usize) -> PortDescriptor {
        match port {
            Self::PORT_IN => PortDescriptor::AUDIO_IN,
            Self::PORT_OUT => PortDescriptor::AUDIO_OUT,
            _ => fault!("passthrough plugin has no port {port}"),
        }
    }

    fn port_name(&self, port: usize) -> &str {
        match port {
            Self::PORT_IN => "in",
            Self::PORT_OUT => "out",
            _ => fault!("passthrough plugin has no port {port}"),
        }
    }

    fn connect(&mut self, port: usize, data: *mut Sample) {
        match self.ports.get_mut(port) {
            Some(slot) => *slot = data,
            None => fault!("attempt to connect unknown passthrough plugin port {port}"),
        }
    }

    fn run(&mut self, frames: usize) {
        let [input, output] = self.ports;
        if input.is_null() || output.is_null() {
            fault!("passthrough plugin ran with disconnected ports");
        }
        // Safety: connected pointers are valid for `frames` samples per the
        // Plugin contract.
        unsafe {
            core::ptr::copy_nonoverlapping(input, output, frames);
        }
    }
}
