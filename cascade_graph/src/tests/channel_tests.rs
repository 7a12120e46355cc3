//! Arrival accounting, backpressure and wiring rules at the channel level.
//!
//! These tests drive channels by hand without activating the domain, so
//! they never complete a filter's inputs (completion would enqueue onto a
//! run queue with no workers).

use std::sync::Arc;
use std::time::Duration;

use crate::Buffer;
use crate::domain::Domain;
use crate::plugins::Passthrough;
use crate::tests::utils;

#[test]
fn inputs_arm_from_links_and_forwards() {
    utils::init_logging();
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    let a_out = a.add_output("out");
    let b = domain.add_io("b");
    b.add_output("out");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    a.connect("out", &f, "in");
    b.connect("out", &f, "in");

    assert_eq!(f.input("in").links_waiting(), 0);
    f.reset_cycle();
    assert_eq!(f.input("in").links_waiting(), 2);
    assert_eq!(f.component().inputs_waiting(), 1);
    assert!(!f.is_ready());

    utils::publish(&a_out, &[1.0; 4]);
    assert_eq!(f.input("in").links_waiting(), 1);
    assert_eq!(f.component().inputs_waiting(), 1);
    assert!(!f.is_ready());
}

#[test]
fn backpressure_blocks_the_producer_until_reset() {
    utils::init_logging();
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    let a_out = a.add_output("out");
    let b = domain.add_io("b");
    b.add_output("out");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    a.connect("out", &f, "in");
    b.connect("out", &f, "in");
    f.reset_cycle();

    utils::publish(&a_out, &[1.0; 4]);

    // A second publish on the same link has to wait for the consumer's
    // reset.
    let blocked = {
        let a_out = a_out.clone();
        std::thread::spawn(move || utils::publish(&a_out, &[2.0; 4]))
    };
    std::thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());

    f.input("in").reset_cycle();
    blocked.join().unwrap();
    assert_eq!(f.input("in").links_waiting(), 1);
}

#[test]
#[should_panic(expected = "already ready")]
fn second_notify_without_reset_is_fatal_when_nonblocking() {
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    let a_out = a.add_output("out");
    let b = domain.add_io("b");
    b.add_output("out");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    a.connect("out", &f, "in");
    b.connect("out", &f, "in");
    f.reset_cycle();

    utils::publish(&a_out, &[1.0; 4]);

    let link = a_out.links()[0].clone();
    let buffer = Arc::new(Buffer::owned(4));
    link.notify(&buffer, false);
}

#[test]
fn unlinked_inputs_yield_the_zero_buffer() {
    let mut domain = Domain::new("main", 48000, 4);
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    let buffer = f.input("in").get_buffer();
    assert!(Arc::ptr_eq(&buffer, domain.zero_buffer()));
    assert!(buffer.as_slice().iter().all(|s| *s == 0.0));
}

#[test]
fn fan_in_mixes_arrivals_into_a_reused_buffer() {
    utils::init_logging();
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    let a_out = a.add_output("out");
    let b = domain.add_io("b");
    let b_out = b.add_output("out");
    let c = domain.add_io("c");
    c.add_output("out");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    a.connect("out", &f, "in");
    b.connect("out", &f, "in");
    c.connect("out", &f, "in");
    f.reset_cycle();

    utils::publish(&a_out, &[1.0, 2.0, 3.0, 4.0]);
    utils::publish(&b_out, &[10.0, 20.0, 30.0, 40.0]);

    let mixed = f.input("in").get_buffer();
    assert_eq!(mixed.as_slice(), &[11.0, 22.0, 33.0, 44.0]);

    let again = f.input("in").get_buffer();
    assert!(Arc::ptr_eq(&mixed, &again));
}

#[test]
#[should_panic(expected = "duplicate input")]
fn duplicate_channel_names_are_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let a = domain.add_io("a");
    a.add_input("in");
    a.add_input("in");
}

#[test]
#[should_panic(expected = "not a forwarder")]
fn forwarding_from_a_non_forwarder_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    let g = domain.add_filter("g", Box::new(Passthrough::new()));
    f.input("in").forward_to(&g.input("in"));
}

#[test]
#[should_panic(expected = "also a forwarder")]
fn forwarding_between_forwarders_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let g1 = domain.add_chain("g1");
    g1.add_input("in");
    let g2 = domain.add_chain("g2");
    g2.add_input("in");
    g1.input("in").forward_to(&g2.input("in"));
}

#[test]
#[should_panic(expected = "forward output from is a forwarder")]
fn output_forwarding_from_a_forwarder_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let g = domain.add_chain("g");
    g.add_output("out");
    let f = domain.add_filter("f", Box::new(Passthrough::new()));
    g.output("out").forward_to(&f.output("out"));
}

#[test]
#[should_panic(expected = "forward output to is not a forwarder")]
fn output_forwarding_to_a_non_forwarder_is_fatal() {
    let mut domain = Domain::new("main", 48000, 4);
    let f1 = domain.add_filter("f1", Box::new(Passthrough::new()));
    let f2 = domain.add_filter("f2", Box::new(Passthrough::new()));
    f1.output("out").forward_to(&f2.output("out"));
}

#[test]
#[should_panic(expected = "across domains")]
fn cross_domain_links_are_fatal() {
    let mut d1 = Domain::new("one", 48000, 4);
    let mut d2 = Domain::new("two", 48000, 4);
    let a = d1.add_io("a");
    a.add_output("out");
    let f = d2.add_filter("f", Box::new(Passthrough::new()));
    a.connect("out", &f, "in");
}
