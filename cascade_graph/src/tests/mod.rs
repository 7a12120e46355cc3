mod channel_tests;
mod node_tests;
mod utils;
