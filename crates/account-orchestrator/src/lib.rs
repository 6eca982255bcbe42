pub mod account_actor;
pub mod account_handle;
pub mod commands;
pub mod deps;
pub mod dispatcher;
pub mod engine;
pub mod registry;
pub mod tick;

#[cfg(test)]
mod testing;

pub use account_actor::AccountActor;
pub use account_handle::AccountHandle;
pub use commands::{
    AccountCommand, AccountState, AccountStatus, DispatchCounters, FeedStatus, IngestEvent,
    StartOptions,
};
pub use deps::AccountDeps;
pub use dispatcher::{ActionDispatcher, ActionReport, DispatchDelays, StepKind, StepOutcome};
pub use engine::{AccountEngine, Evaluation, EvaluationRecord, PlannedAction};
pub use registry::AccountRegistry;
pub use tick::{SymbolError, TickReport};
