//! Action configuration and the runner behind the `backport` binary.

pub mod app;
pub mod config;

pub use app::{Outcome, Runner};
pub use config::{ActionConfig, Inputs, RunnerContext};
