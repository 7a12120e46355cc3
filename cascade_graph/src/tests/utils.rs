//! Shared helpers for the graph tests: a mock driver's publish side, test
//! plugins, and polling utilities.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cascade_primitives::Buffer;

use crate::Sample;
use crate::channel::Output;
use crate::node::{Node, NodeKind};
use crate::plugin::{Plugin, PortDescriptor};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Publish a block on an output the way a driver's capture side would.
pub(crate) fn publish(output: &Arc<Output>, samples: &[Sample]) {
    let size = output.parent().core().buffer_size();
    let buffer = Buffer::owned(size);
    buffer.set(samples);
    output.set_buffer(Arc::new(buffer));
}

pub(crate) fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// How many publish phases an io node's driver callback has completed.
pub(crate) fn process_entries(node: &Arc<Node>) -> usize {
    match &node.kind {
        NodeKind::Io(bridge) => bridge.process_entries(),
        _ => panic!("{} is not an io node", node.name()),
    }
}

pub(crate) fn take_watchdog_thread(node: &Arc<Node>) -> std::thread::JoinHandle<()> {
    match &node.kind {
        NodeKind::Io(bridge) => bridge
            .take_watchdog_thread()
            .expect("no watchdog is running"),
        _ => panic!("{} is not an io node", node.name()),
    }
}

/// What a [`CapturePlugin`] observed during its last run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Captured {
    pub(crate) pointer: usize,
    pub(crate) samples: Vec<Sample>,
}

pub(crate) type CaptureRecord = Arc<Mutex<Option<Captured>>>;

/// Audio sink plugin recording its input block and the buffer address it
/// was connected to.
pub(crate) struct CapturePlugin {
    input: *mut Sample,
    record: CaptureRecord,
}

// Safety: the connected pointer is a channel buffer valid while connected.
unsafe impl Send for CapturePlugin {}

impl CapturePlugin {
    pub(crate) fn new() -> (CapturePlugin, CaptureRecord) {
        let record = CaptureRecord::default();
        (
            CapturePlugin {
                input: core::ptr::null_mut(),
                record: record.clone(),
            },
            record,
        )
    }
}

impl Plugin for CapturePlugin {
    fn port_count(&self) -> usize {
        1
    }

    fn port_descriptor(&self, _port: usize) -> PortDescriptor {
        PortDescriptor::AUDIO_IN
    }

    fn port_name(&self, _port: usize) -> &str {
        "in"
    }

    fn connect(&mut self, port: usize, data: *mut Sample) {
        assert_eq!(port, 0);
        self.input = data;
    }

    fn run(&mut self, frames: usize) {
        assert!(!self.input.is_null());
        let samples = unsafe { core::slice::from_raw_parts(self.input, frames) }.to_vec();
        *self.record.lock().unwrap() = Some(Captured {
            pointer: self.input as usize,
            samples,
        });
    }
}

/// Passthrough plugin that stalls in `run`, for deadline tests.
pub(crate) struct SleepyPlugin {
    ports: [*mut Sample; 2],
    delay: Duration,
}

// Safety: as for [`CapturePlugin`].
unsafe impl Send for SleepyPlugin {}

impl SleepyPlugin {
    pub(crate) fn new(delay: Duration) -> SleepyPlugin {
        SleepyPlugin {
            ports: [core::ptr::null_mut(); 2],
            delay,
        }
    }
}

impl Plugin for SleepyPlugin {
    fn port_count(&self) -> usize {
        2
    }

    fn port_descriptor(&self, port: usize) -> PortDescriptor {
        match port {
            0 => PortDescriptor::AUDIO_IN,
            _ => PortDescriptor::AUDIO_OUT,
        }
    }

    fn port_name(&self, port: usize) -> &str {
        match port {
            0 => "in",
            _ => "out",
        }
    }

    fn connect(&mut self, port: usize, data: *mut Sample) {
        self.ports[port] = data;
    }

    fn run(&mut self, frames: usize) {
        std::thread::sleep(self.delay);
        let [input, output] = self.ports;
        assert!(!input.is_null() && !output.is_null());
        unsafe { core::ptr::copy_nonoverlapping(input, output, frames) };
    }
}

/// Publishes the peak absolute sample of its input block to a control
/// output.
pub(crate) struct MeterPlugin {
    ports: [*mut Sample; 2],
}

// Safety: as for [`CapturePlugin`].
unsafe impl Send for MeterPlugin {}

impl MeterPlugin {
    pub(crate) fn new() -> MeterPlugin {
        MeterPlugin {
            ports: [core::ptr::null_mut(); 2],
        }
    }
}

impl Plugin for MeterPlugin {
    fn port_count(&self) -> usize {
        2
    }

    fn port_descriptor(&self, port: usize) -> PortDescriptor {
        match port {
            0 => PortDescriptor::AUDIO_IN,
            _ => PortDescriptor::CONTROL_OUT,
        }
    }

    fn port_name(&self, port: usize) -> &str {
        match port {
            0 => "in",
            _ => "level",
        }
    }

    fn connect(&mut self, port: usize, data: *mut Sample) {
        self.ports[port] = data;
    }

    fn run(&mut self, frames: usize) {
        let [input, level] = self.ports;
        assert!(!input.is_null() && !level.is_null());
        unsafe {
            let mut peak: Sample = 0.0;
            for i in 0..frames {
                peak = peak.max((*input.add(i)).abs());
            }
            *level = peak;
        }
    }
}
