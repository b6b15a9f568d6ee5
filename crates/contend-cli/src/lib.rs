//! Command implementations and output helpers behind the `contend` binary.

pub mod commands;
pub mod output;

pub use commands::*;
pub use output::*;
