//! Command implementations for the agenda CLI

mod ask;
mod chat;
mod clear;
mod stats;
mod warm;

pub use ask::execute as ask;
pub use chat::execute as chat;
pub use clear::run as clear_cache;
pub use stats::execute as show_stats;
pub use warm::execute as warm;
