//! Node lifecycle rules and the property surface.

use crate::domain::Domain;
use crate::plugins::{Gain, Passthrough};
use crate::property::PropertyKind;
use crate::tests::utils;

#[test]
fn filter_ports_become_channels_and_properties() {
    utils::init_logging();
    let mut domain = Domain::new("main", 48000, 4);
    let g = domain.add_filter("g", Box::new(Gain::new()));

    // Audio ports became channels, declared as properties.
    g.input("in");
    g.output("out");
    assert_eq!(g.peek("input:in"), "audio");
    assert_eq!(g.peek("output:out"), "audio");

    assert_eq!(g.peek("node:name"), "g");
    assert_eq!(g.peek("node:domain"), "main");
    assert_eq!(g.peek("node:class"), "cascade::filter");

    // The control port default came from the plugin's hint.
    assert_eq!(g.property_real("config:gain"), 1.0);
    assert_eq!(g.peek("gain"), "1");
}

#[test]
fn poke_parses_into_the_property_kind() {
    let mut domain = Domain::new("main", 48000, 4);
    let g = domain.add_filter("g", Box::new(Gain::new()));
    g.poke("gain", "2.5");
    assert_eq!(g.property_real("config:gain"), 2.5);

    let io = domain.add_io("io");
    io.poke("watchdog_ms", "250");
    assert_eq!(io.property_size("config:watchdog_ms"), 250);
}

#[test]
#[should_panic(expected = "no property existed")]
fn unknown_properties_are_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let g = domain.add_filter("g", Box::new(Gain::new()));
    g.peek("config:missing");
}

#[test]
#[should_panic(expected = "duplicate property")]
fn duplicate_properties_are_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let io = domain.add_io("io");
    io.add_property("config:extra", PropertyKind::Real);
    io.add_property("config:extra", PropertyKind::Real);
}

#[test]
#[should_panic(expected = "never try to execute")]
fn executing_a_forwarder_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let chain = domain.add_chain("chain");
    chain.execute();
}

#[test]
#[should_panic(expected = "never try to notify")]
fn notifying_a_forwarder_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let chain = domain.add_chain("chain");
    chain.notify();
}

#[test]
#[should_panic(expected = "invalid number of threads")]
fn activating_without_workers_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    domain.activate(0);
}

#[test]
#[should_panic(expected = "already activated")]
fn reactivating_a_domain_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    domain.activate(1);
    domain.activate(1);
}

#[test]
#[should_panic(expected = "after activation")]
fn adding_nodes_after_activation_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    domain.activate(1);
    domain.add_chain("late");
}

#[test]
#[should_panic(expected = "no node named")]
fn unknown_node_lookup_is_fatal() {
    let domain = Domain::new("main", 48000, 4);
    domain.node("missing");
}

#[test]
fn nodes_are_found_by_name() {
    let mut domain = Domain::new("main", 48000, 4);
    let g = domain.add_filter("g", Box::new(Gain::new()));
    assert_eq!(domain.node("g").id(), g.id());
}

#[test]
fn wildcard_connect_links_every_channel() {
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    a.add_output("left");
    a.add_output("right");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    a.connect("*", &f, "in");
    assert_eq!(f.input("in").fan_in(), 2);
}

#[test]
#[should_panic(expected = "zero buffer size")]
fn zero_buffer_size_domains_are_fatal() {
    Domain::new("main", 48000, 0);
}
