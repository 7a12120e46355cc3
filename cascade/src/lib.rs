//! # Cascade
//!
//! A realtime audio processing engine: a directed graph of nodes executed
//! block-by-block by worker threads inside a [`Domain`], bridged to external
//! audio drivers through IO nodes.
//!
//! This crate re-exports [`cascade_graph`]; see that crate for the engine
//! internals. With the `jack` feature enabled the JACK backend in
//! [`audio_backend::jack`] drives an IO node from a JACK client.
//!
//! ```no_run
//! use cascade::prelude::*;
//!
//! let mut domain = Domain::new("main", 48000, 64);
//! let source = domain.add_io("capture");
//! source.add_output("out");
//! let filter = domain.add_filter("gain", Box::new(cascade::plugins::Gain::new()));
//! source.connect("out", &filter, "in");
//! domain.activate(2);
//! ```

pub use cascade_graph::*;

/// The common imports for building and running a graph.
pub mod prelude {
    pub use cascade_graph::audio_backend::AudioBackend;
    pub use cascade_graph::{
        Buffer, Domain, Node, Plugin, PortClass, PortDescriptor, PortDirection, PropertyKind,
        Sample, ZeroSource,
    };
}
