//! Sightline Runtime
//!
//! Walks a [`TaskGraph`](sightline_graph::TaskGraph) against a live session.
//!
//! The [`Executor`] is an explicit state machine: [`Executor::step`] performs
//! one iteration against an [`ExecutionContext`], and [`Executor::run`] drives
//! steps until the run succeeds, fails or is interrupted. The only suspension
//! points are frame acquisition, gesture dispatch and sleeps.
//!
//! Faults inside a run are values, not errors: the final [`RunState`] says how
//! the run ended and the context's trace records every decision in order.

mod action;
mod backoff;
mod context;
mod events;
mod executor;
mod interrupt;
mod predicate;
mod state;

pub use backoff::delay_for;
pub use context::{ExecutionContext, PredicateResult, RetryCause, TraceEntry, TraceEvent};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{Executor, ExecutorConfig, RunReport};
pub use interrupt::Interrupt;
pub use state::{FailureReason, RunState};
