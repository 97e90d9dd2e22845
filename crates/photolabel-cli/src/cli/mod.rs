//! Command-line interface for photolabel.

mod commands;

pub use commands::{is_verbose, run};
