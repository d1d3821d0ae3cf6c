
#[macro_use]
extern crate tracing;

pub mod args;
pub mod log;
pub mod utils;
