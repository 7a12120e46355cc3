//! # JACK audio backend
//!
//! Drives an IO node as a JACK client. The node's graph outputs become JACK
//! capture ports (audio into the graph) and its graph inputs become JACK
//! playback ports (audio out of the graph).
//!
//! Requires the `jack` feature to be enabled in Cargo. See the `jack` crate
//! for compilation dependencies.

use std::sync::Arc;
use std::time::Duration;

use ecow::EcoString;

use crate::Sample;
use crate::audio_backend::{AudioBackend, AudioBackendError};
use crate::fault;
use crate::node::Node;

enum JackClient {
    Passive(jack::Client),
    Active(jack::AsyncClient<JackNotifications, JackProcess>),
}

/// A backend using JACK.
pub struct JackBackend {
    client: Option<JackClient>,
    sample_rate: u32,
    block_size: usize,
}

impl JackBackend {
    /// Create a new JACK client using the given name.
    pub fn new<S: AsRef<str>>(name: S) -> Result<Self, jack::Error> {
        let (client, _status) =
            jack::Client::new(name.as_ref(), jack::ClientOptions::NO_START_SERVER)?;
        let sample_rate = client.sample_rate() as u32;
        let block_size = client.buffer_size() as usize;
        Ok(Self {
            client: Some(JackClient::Passive(client)),
            sample_rate,
            block_size,
        })
    }
}

impl AudioBackend for JackBackend {
    fn stop(&mut self) -> Result<(), AudioBackendError> {
        match self.client.take() {
            Some(JackClient::Active(active_client)) => {
                active_client.deactivate()?;
                Ok(())
            }
            _ => Err(AudioBackendError::BackendNotRunning),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> Option<usize> {
        Some(self.block_size)
    }

    fn start(&mut self, node: Arc<Node>) -> Result<(), AudioBackendError> {
        match self.client.take() {
            Some(JackClient::Passive(client)) => {
                if self.sample_rate != node.core().sample_rate() {
                    fault!(
                        "jack sample rate {} did not match domain sample rate {}",
                        self.sample_rate,
                        node.core().sample_rate()
                    );
                }
                if self.block_size != node.core().buffer_size() {
                    fault!(
                        "jack buffer size {} did not match domain buffer size {}",
                        self.block_size,
                        node.core().buffer_size()
                    );
                }

                // Graph outputs receive from jack, graph inputs send to it.
                let mut in_ports = vec![];
                let mut in_names = vec![];
                for name in node.component().output_names() {
                    in_ports.push(client.register_port(&name, jack::AudioIn::default())?);
                    in_names.push(name);
                }
                let mut out_ports = vec![];
                let mut out_names = vec![];
                for name in node.component().input_names() {
                    out_ports.push(client.register_port(&name, jack::AudioOut::default())?);
                    out_names.push(name);
                }

                let watchdog_ms = node.property_size("config:watchdog_ms");
                node.start_watchdog(Duration::from_millis(watchdog_ms));

                let jack_process = JackProcess {
                    node,
                    in_ports,
                    in_names,
                    out_ports,
                    out_names,
                };
                let active_client = client.activate_async(JackNotifications, jack_process)?;
                self.client = Some(JackClient::Active(active_client));
                Ok(())
            }
            _ => Err(AudioBackendError::BackendAlreadyRunning),
        }
    }
}

struct JackProcess {
    node: Arc<Node>,
    in_ports: Vec<jack::Port<jack::AudioIn>>,
    in_names: Vec<EcoString>,
    out_ports: Vec<jack::Port<jack::AudioOut>>,
    out_names: Vec<EcoString>,
}

impl jack::ProcessHandler for JackProcess {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let nframes = ps.n_frames() as usize;

        let receives: Vec<(&str, *const Sample)> = self
            .in_names
            .iter()
            .zip(self.in_ports.iter())
            .map(|(name, port)| (name.as_str(), port.as_slice(ps).as_ptr()))
            .collect();
        let sends: Vec<(&str, *mut Sample)> = self
            .out_names
            .iter()
            .zip(self.out_ports.iter_mut())
            .map(|(name, port)| (name.as_str(), port.as_mut_slice(ps).as_mut_ptr()))
            .collect();

        // Safety: jack's port buffers are valid for this callback, which
        // does not return until `process` does.
        unsafe {
            self.node.process(&receives, &sends, nframes);
        }
        jack::Control::Continue
    }
}

struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn thread_init(&self, _: &jack::Client) {}

    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, _reason: &str) {}

    fn sample_rate(&mut self, _: &jack::Client, _srate: jack::Frames) -> jack::Control {
        jack::Control::Continue
    }

    fn xrun(&mut self, _: &jack::Client) -> jack::Control {
        jack::Control::Continue
    }
}
