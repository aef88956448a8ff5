#![forbid(unsafe_code)]

pub mod interleave;
pub mod model;
pub mod time;

pub use interleave::{Baseline, SessionSeed, interleave};
pub use time::Clock;
