//! # stealsim - a step-driven work-stealing runtime simulator
//!
//! This crate models the exact structural moves a work-stealing scheduler
//! performs, one operator-chosen control point at a time:
//!
//! - **Frame tree**: the global spawn/call tree of function activations
//! - **Stacklets**: contiguous call chains, the unit a thief steals
//! - **Deques**: per-worker stacklet queues (head stolen, tail worked)
//! - **Splitters**: named hyperobjects with per-branch views, reconciled
//!   when a suspended frame is resumed by a provably-good steal
//!
//! Nothing here is parallel. The simulator is deterministic and driven by a
//! single action at a time, which is what lets it show scheduler internals
//! (steal-back at sync, hypermap ownership transfer, view merging) that a
//! real runtime hides.
//!
//! ## Example
//!
//! ```rust
//! use stealsim::{parse_action, Rts};
//!
//! let mut rts = Rts::new(4);
//! for line in ["spawn 0", "steal 1 0", "return 0"] {
//!     let action = parse_action(line).unwrap();
//!     rts.do_action(&action).unwrap();
//! }
//! // Worker 0 returned from the spawned frame and went idle; worker 1
//! // still runs the stolen continuation of the initial frame.
//! assert!(rts.workers()[0].is_idle());
//! assert!(!rts.workers()[1].is_idle());
//! ```

mod action;
mod deque;
mod frame;
mod render;
mod rts;
mod splitter;
mod store;
mod worker;

pub use action::{parse_action, Action, ParseError};
pub use deque::{Deque, Stacklet};
pub use frame::{Frame, FrameArena, FrameId, FrameKind, Payload};
pub use rts::Rts;
pub use splitter::{HMap, HMapArena, HMapDeque, HMapId, View, ViewArena, ViewId};
pub use store::Store;
pub use worker::{Worker, WorkerId};

/// Error type for rejected runtime actions.
///
/// Every variant maps to a precondition of one of the control-point
/// operations; a rejected action leaves the runtime state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("there is no frame on the deque, cannot {0}")]
    EmptyDeque(&'static str),
    #[error("thief deque is not empty, cannot steal")]
    NonemptyThiefDeque,
    #[error("victim does not have an available stacklet to steal")]
    InsufficientVictim,
    #[error("cannot return from the initial frame in this simulation")]
    ReturnFromInitial,
    #[error("frame has outstanding children, cannot return until all children have finished")]
    OutstandingChildren,
    #[error("splitter {0} not found")]
    UnknownSplitter(String),
    #[error("splitter {0} cannot be popped here")]
    PopOutOfScope(String),
    #[error("cannot return without having popped all pushed splitters")]
    UnpoppedOnReturn,
    #[error("worker {0} does not exist")]
    UnknownWorker(usize),
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

/// Result type for runtime actions
pub type Result<T> = std::result::Result<T, Error>;
