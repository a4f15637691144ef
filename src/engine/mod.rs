//! The alignment stage: configuration and driver.

pub mod alignment;
pub mod args;

pub use alignment::{resolve_mode, AlignStats, Alignment};
pub use args::AlignArgs;

pub use alignment::run;
