pub mod timer;

pub use timer::{Deadline, HighPrecisionTimer, Timer, VirtualTimer};
