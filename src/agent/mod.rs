//! Agent loop execution.

pub mod executor;

pub use executor::AgentExecutor;
