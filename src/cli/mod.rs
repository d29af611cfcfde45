//! Command implementations and terminal output.

pub mod forecast;
pub mod history;
pub mod rates;
pub mod setup;
pub mod sync;
pub mod ui;
pub mod watch;
