//! Object and interface lifecycle state machines
//!
//! Both machines are pure transition functions. Drivers in
//! [`crate::object::instance`] and [`crate::object::dynamic`] apply them under
//! the object lock and run hooks between the steps.
//!
//! Asynchronous requests go through two phases. The request enters
//! `Pending` and is queued on the engine's worker pool; until a worker
//! dispatches it the caller may abort it (`Pending -> Aborted`). Dispatch
//! turns `Pending` into `Committing` (the hook runs) or settles an aborted
//! request back to where it started. An abort arriving after dispatch is
//! rejected and has no effect.

use std::fmt;

use serde::Serialize;

use crate::error::SlError;

/// How a lifecycle request is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Hook runs on the caller's thread
    Sync,
    /// Hook runs on an engine worker; the result arrives via callback
    Async,
}

impl Mode {
    pub fn is_async(self) -> bool {
        matches!(self, Mode::Async)
    }

    fn initial_phase(self) -> Phase {
        match self {
            Mode::Sync => Phase::Committing,
            Mode::Async => Phase::Pending,
        }
    }
}

/// Sub-state of an in-flight two-phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Queued, not yet dispatched
    Pending,
    /// Queued and cancelled
    Aborted,
    /// Hook running or about to commit
    Committing,
}

/// Settled state a resume started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResumeOrigin {
    Realized,
    Suspended,
}

impl From<ResumeOrigin> for ObjectState {
    fn from(origin: ResumeOrigin) -> Self {
        match origin {
            ResumeOrigin::Realized => ObjectState::Realized,
            ResumeOrigin::Suspended => ObjectState::Suspended,
        }
    }
}

/// Overall object state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectState {
    Unrealized,
    Realizing(Phase),
    Realized,
    Resuming { phase: Phase, from: ResumeOrigin },
    Suspending,
    Suspended,
    Destroying,
    Destroyed,
}

impl ObjectState {
    /// No transition is in flight
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            ObjectState::Unrealized
                | ObjectState::Realized
                | ObjectState::Suspended
                | ObjectState::Destroyed
        )
    }

    pub fn is_transient(self) -> bool {
        !self.is_settled()
    }

    /// Realization completed and destruction has not started
    pub fn has_been_realized(self) -> bool {
        matches!(
            self,
            ObjectState::Realized
                | ObjectState::Resuming { .. }
                | ObjectState::Suspending
                | ObjectState::Suspended
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ObjectState::Destroyed)
    }
}

/// Inputs to the object state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectInput {
    Realize(Mode),
    Resume(Mode),
    Suspend,
    /// A worker picked up a queued request
    Dispatch,
    Abort,
    /// Hook finished; `Destroying` ignores the flag
    Commit { success: bool },
    Destroy,
}

/// Inputs to the interface state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceInput {
    Expose,
    Add(Mode),
    Remove,
    Suspend,
    Resume(Mode),
    Dispatch,
    Abort,
    /// Finish the running phase; a failed add or resume returns to its origin
    Commit { success: bool },
}

/// Settled state an add started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddOrigin {
    Uninitialized,
    Exposed,
}

impl From<AddOrigin> for InterfaceState {
    fn from(origin: AddOrigin) -> Self {
        match origin {
            AddOrigin::Uninitialized => InterfaceState::Uninitialized,
            AddOrigin::Exposed => InterfaceState::Exposed,
        }
    }
}

/// State of one interface slot of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InterfaceState {
    Uninitialized,
    Exposed,
    Adding { phase: Phase, from: AddOrigin },
    Added,
    Removing,
    Suspending,
    Suspended,
    Resuming(Phase),
}

impl InterfaceState {
    /// Interface can be retrieved and used by the application
    pub fn is_usable(self) -> bool {
        matches!(self, InterfaceState::Exposed | InterfaceState::Added)
    }

    pub fn is_transient(self) -> bool {
        matches!(
            self,
            InterfaceState::Adding { .. }
                | InterfaceState::Removing
                | InterfaceState::Suspending
                | InterfaceState::Resuming(_)
        )
    }
}

/// A transition the machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected<S, I> {
    pub state: S,
    pub input: I,
}

impl<S: fmt::Debug, I: fmt::Debug> fmt::Display for Rejected<S, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} not allowed in state {:?}", self.input, self.state)
    }
}

impl<S, I> From<Rejected<S, I>> for SlError {
    fn from(_: Rejected<S, I>) -> Self {
        SlError::InvalidState
    }
}

/// Object transition function
pub fn object_step(
    state: ObjectState,
    input: ObjectInput,
) -> Result<ObjectState, Rejected<ObjectState, ObjectInput>> {
    use ObjectInput as In;
    use ObjectState as St;

    let next = match (state, input) {
        (St::Unrealized, In::Realize(mode)) => St::Realizing(mode.initial_phase()),
        (St::Realizing(Phase::Pending), In::Dispatch) => St::Realizing(Phase::Committing),
        (St::Realizing(Phase::Aborted), In::Dispatch) => St::Unrealized,
        (St::Realizing(Phase::Pending), In::Abort) => St::Realizing(Phase::Aborted),
        (St::Realizing(Phase::Committing), In::Commit { success }) => {
            if success {
                St::Realized
            } else {
                St::Unrealized
            }
        }

        (St::Realized, In::Resume(mode)) => St::Resuming {
            phase: mode.initial_phase(),
            from: ResumeOrigin::Realized,
        },
        (St::Suspended, In::Resume(mode)) => St::Resuming {
            phase: mode.initial_phase(),
            from: ResumeOrigin::Suspended,
        },
        (St::Resuming { phase: Phase::Pending, from }, In::Dispatch) => St::Resuming {
            phase: Phase::Committing,
            from,
        },
        (St::Resuming { phase: Phase::Aborted, from }, In::Dispatch) => St::from(from),
        (St::Resuming { phase: Phase::Pending, from }, In::Abort) => St::Resuming {
            phase: Phase::Aborted,
            from,
        },
        (St::Resuming { phase: Phase::Committing, from }, In::Commit { success }) => {
            if success {
                St::Realized
            } else {
                St::from(from)
            }
        }

        (St::Realized, In::Suspend) => St::Suspending,
        (St::Suspending, In::Commit { success }) => {
            if success {
                St::Suspended
            } else {
                St::Realized
            }
        }

        (St::Destroying, In::Commit { .. }) => St::Destroyed,
        (St::Destroying | St::Destroyed, In::Destroy) => {
            return Err(Rejected { state, input });
        }
        (_, In::Destroy) => St::Destroying,

        _ => return Err(Rejected { state, input }),
    };
    Ok(next)
}

/// Interface transition function
pub fn interface_step(
    state: InterfaceState,
    input: InterfaceInput,
) -> Result<InterfaceState, Rejected<InterfaceState, InterfaceInput>> {
    use InterfaceInput as In;
    use InterfaceState as St;

    let next = match (state, input) {
        (St::Uninitialized, In::Expose) => St::Exposed,

        (St::Uninitialized, In::Add(mode)) => St::Adding {
            phase: mode.initial_phase(),
            from: AddOrigin::Uninitialized,
        },
        (St::Exposed, In::Add(mode)) => St::Adding {
            phase: mode.initial_phase(),
            from: AddOrigin::Exposed,
        },
        (St::Adding { phase: Phase::Pending, from }, In::Dispatch) => St::Adding {
            phase: Phase::Committing,
            from,
        },
        (St::Adding { phase: Phase::Aborted, from }, In::Dispatch) => St::from(from),
        (St::Adding { phase: Phase::Pending, from }, In::Abort) => St::Adding {
            phase: Phase::Aborted,
            from,
        },
        (St::Adding { phase: Phase::Committing, from }, In::Commit { success }) => {
            if success {
                St::Added
            } else {
                St::from(from)
            }
        }

        (St::Added, In::Remove) => St::Removing,
        (St::Removing, In::Commit { .. }) => St::Uninitialized,

        (St::Added, In::Suspend) => St::Suspending,
        (St::Suspending, In::Commit { .. }) => St::Suspended,

        (St::Suspended, In::Resume(mode)) => St::Resuming(mode.initial_phase()),
        (St::Resuming(Phase::Pending), In::Dispatch) => St::Resuming(Phase::Committing),
        (St::Resuming(Phase::Aborted), In::Dispatch) => St::Suspended,
        (St::Resuming(Phase::Pending), In::Abort) => St::Resuming(Phase::Aborted),
        (St::Resuming(Phase::Committing), In::Commit { success }) => {
            if success {
                St::Added
            } else {
                St::Suspended
            }
        }

        _ => return Err(Rejected { state, input }),
    };
    Ok(next)
}
