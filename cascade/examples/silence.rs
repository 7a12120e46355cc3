//! Run a graph without audio hardware: a zero source ticking a gain filter.

use std::time::Duration;

use cascade::prelude::*;

fn main() {
    env_logger::init();

    let mut domain = Domain::new("main", 48000, 64);

    let source = domain.add_io("source");
    source.add_output("out");

    let gain = domain.add_filter("gain", Box::new(cascade::plugins::Gain::new()));
    gain.poke("gain", "0.5");
    source.connect("out", &gain, "in");

    domain.activate(2);

    let mut zero = ZeroSource::new(source);
    zero.node().poke("max_cycles", "500");
    zero.start();
    zero.join();

    println!(
        "processed {} cycles of silence",
        zero.node().peek("state:cycle_num")
    );
    std::thread::sleep(Duration::from_millis(10));
}
