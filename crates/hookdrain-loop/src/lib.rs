//! hookdrain-loop — the drain decision loop.
//!
//! Decides whether an instance whose termination is paused by a
//! lifecycle hook may be terminated. Polls a peak-usage metric, keeps
//! the pause alive with heartbeats while usage is non-zero, and resolves
//! the pause exactly once.
//!
//! # State Machine
//!
//! ```text
//!            ┌──── wait delay ────┐
//!            ▼                    │
//! attempt i: CHECKING ── usage > 0 or no data ──┘
//!            │
//!            ├── usage == 0 ───────────────► RESOLVED(CONTINUE)
//!            ├── metric query error ───────► RESOLVED(ABANDON)
//!            └── i == max_attempts ────────► RESOLVED(ABANDON)
//!
//! heartbeat before the query on every attempt i > 0 (failures ignored)
//! ```
//!
//! `DrainLoop::run` sleeps between cycles in-process. `DrainScheduler`
//! persists each drain's `AttemptState` and re-enters `DrainLoop::step`
//! when the next check is due, for hosts that cannot hold a task for the
//! full `max_attempts × delay` budget.

pub mod drain;
pub mod handler;
pub mod scheduler;

#[cfg(test)]
mod fakes;

pub use drain::{Clock, DrainLoop, DrainReport};
pub use handler::handle_event;
pub use scheduler::DrainScheduler;
