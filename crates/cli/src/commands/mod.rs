//! CLI commands for the position-guard engine.

pub mod forward;
pub mod run;
pub mod serve;
pub mod tick;

pub use forward::{run_forward, ForwardArgs};
pub use run::{run_account, RunArgs};
pub use serve::{run_serve, ServeArgs};
pub use tick::{run_tick, TickArgs};
