//! The bridge between an external audio driver's realtime callback and the
//! graph.
//!
//! The driver thread enters through [`Node::process`]: it publishes its
//! capture buffers into the node's outputs (which starts the cycle
//! downstream) and parks on a condition variable. When the graph cycle
//! completes back through the node's inputs, [`Node::will_run`] copies the
//! sink buffers into the driver's playback memory, signals done and re-arms
//! the node, and the driver thread returns to its driver.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cascade_primitives::Buffer;
use ecow::EcoString;
use smallvec::SmallVec;

use crate::Sample;
use crate::fault;
use crate::node::{Node, NodeKind};
use crate::watchdog::Watchdog;

/// A driver playback pointer stashed for the current cycle.
struct SendPtr(*mut Sample);

// Safety: the pointer is written from a worker thread while the driver
// thread that owns the pointee is parked on the done condition variable, and
// it is cleared before that thread resumes.
unsafe impl Send for SendPtr {}

pub(crate) struct IoBridge {
    done_flag: Mutex<bool>,
    done_condition: Condvar,
    sends: Mutex<SmallVec<[(EcoString, SendPtr); 4]>>,
    watchdog: Mutex<Option<Watchdog>>,
    /// Completed publish phases, observed by tests to sequence publishes
    /// against the driver callback.
    #[cfg(test)]
    process_entries: std::sync::atomic::AtomicUsize,
}

impl IoBridge {
    pub(crate) fn new() -> IoBridge {
        IoBridge {
            done_flag: Mutex::new(false),
            done_condition: Condvar::new(),
            sends: Mutex::new(SmallVec::new()),
            watchdog: Mutex::new(None),
            #[cfg(test)]
            process_entries: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn process_entries(&self) -> usize {
        self.process_entries
            .load(std::sync::atomic::Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn take_watchdog_thread(&self) -> Option<std::thread::JoinHandle<()>> {
        self.watchdog
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|watchdog| watchdog.take_thread())
    }
}

impl Node {
    fn io_bridge(&self) -> &IoBridge {
        match &self.kind {
            NodeKind::Io(bridge) => bridge,
            _ => fault!("node {} is not an io node", self.name()),
        }
    }

    /// Arm the deadline watchdog for this IO node. Driver adapters call this
    /// when they start their stream; every successful block resets it.
    pub fn start_watchdog(&self, timeout: Duration) {
        let bridge = self.io_bridge();
        let mut watchdog = bridge.watchdog.lock().unwrap();
        if watchdog.is_some() {
            fault!("watchdog is already running for node {}", self.name());
        }
        *watchdog = Some(Watchdog::start(
            format!("driver deadline for node {}", self.name()),
            timeout,
        ));
    }

    /// The driver's process callback.
    ///
    /// `receives` pairs graph output names with the driver's capture buffers
    /// for this block; `sends` pairs graph input names with its playback
    /// buffers. Blocks until the graph cycle has completed through this
    /// node.
    ///
    /// # Safety
    ///
    /// Every pointer must be valid for `nframes` samples until this function
    /// returns, and nothing else may touch the pointed-to memory during the
    /// call. Must be invoked from a single dedicated driver thread.
    pub unsafe fn process(
        &self,
        receives: &[(&str, *const Sample)],
        sends: &[(&str, *mut Sample)],
        nframes: usize,
    ) {
        log::trace!("driver process callback invoked for node {}", self.name());
        let bridge = self.io_bridge();

        let guard = self.node_mutex.lock().unwrap();

        if *bridge.done_flag.lock().unwrap() {
            fault!("driver process callback went reentrant for node {}", self.name());
        }

        if nframes != self.core().buffer_size() {
            fault!(
                "driver block size {nframes} does not match domain buffer size {}",
                self.core().buffer_size()
            );
        }

        {
            let mut stash = bridge.sends.lock().unwrap();
            stash.clear();
            for (name, pointer) in sends {
                stash.push((EcoString::from(*name), SendPtr(*pointer)));
            }
        }

        for (name, pointer) in receives {
            let output = self.component().get_output(name);
            // Safety: the caller guarantees the pointee outlives this call,
            // and the consumers reading the published buffer finish before
            // the done flag releases us.
            let buffer = unsafe { Buffer::borrowed(*pointer as *mut Sample, nframes) };
            output.set_buffer(Arc::new(buffer));
        }

        drop(guard);

        #[cfg(test)]
        bridge
            .process_entries
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);

        log::trace!("waiting for node {} to become done", self.name());
        let mut done = bridge.done_flag.lock().unwrap();
        while !*done {
            done = bridge.done_condition.wait(done).unwrap();
        }
        *done = false;
        drop(done);

        if let Some(watchdog) = bridge.watchdog.lock().unwrap().as_ref() {
            watchdog.reset();
        }
        log::trace!("giving control back to the driver for node {}", self.name());
    }

    /// Graph-side completion for an IO node: all inputs are satisfied, so
    /// copy them into the driver's playback buffers, release the parked
    /// driver thread and re-arm.
    ///
    /// Holding the node mutex across the copy, the done signal and the reset
    /// serialises this against the next process callback, which takes the
    /// same mutex before publishing.
    pub(crate) fn io_release(self: &Arc<Self>) {
        log::trace!("io node {} is completing its cycle", self.name());
        let bridge = self.io_bridge();
        let _guard = self.node_mutex.lock().unwrap();
        let frames = self.core().buffer_size();

        {
            let stash = bridge.sends.lock().unwrap();
            for name in self.component().input_names() {
                let input = self.component().get_input(&name);
                let buffer = input.get_buffer();
                let Some((_, pointer)) = stash.iter().find(|(n, _)| *n == name) else {
                    fault!("no driver port for input {}:{name}", self.name());
                };
                // Safety: the driver thread owning the pointee is parked on
                // the done condition until we signal below.
                unsafe {
                    core::ptr::copy_nonoverlapping(buffer.as_slice().as_ptr(), pointer.0, frames);
                }
            }
        }

        let mut done = bridge.done_flag.lock().unwrap();
        *done = true;
        bridge.done_condition.notify_all();
        drop(done);

        self.reset_cycle();
    }
}
