use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Active,
    Completed,
    Failed,
    Merged,
    Abandoned,
}

impl BranchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BranchStatus::Failed | BranchStatus::Merged | BranchStatus::Abandoned)
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BranchStatus::Active => "active",
            BranchStatus::Completed => "completed",
            BranchStatus::Failed => "failed",
            BranchStatus::Merged => "merged",
            BranchStatus::Abandoned => "abandoned",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchEvent {
    Complete,
    Fail { reason: String },
    Merge,
    Abandon,
}

/// Lifecycle of one feature branch.
///
/// `active` may move to any other state. `completed` only moves on to
/// `merged`. `failed`, `merged` and `abandoned` ignore every event.
#[derive(Debug)]
pub struct BranchLifecycle {
    branch: String,
    status: BranchStatus,
    failure_reason: Option<String>,
}

impl BranchLifecycle {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            status: BranchStatus::Active,
            failure_reason: None,
        }
    }

    pub fn status(&self) -> BranchStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[state_machine(initial = "State::active()")]
impl BranchLifecycle {
    #[state]
    fn active(&mut self, event: &BranchEvent) -> Outcome<State> {
        match event {
            BranchEvent::Complete => {
                self.status = BranchStatus::Completed;
                tracing::info!(branch = %self.branch, "Branch work completed");
                Transition(State::completed())
            }
            BranchEvent::Fail { reason } => {
                self.status = BranchStatus::Failed;
                self.failure_reason = Some(reason.clone());
                tracing::warn!(branch = %self.branch, reason = %reason, "Branch failed");
                Transition(State::failed())
            }
            BranchEvent::Merge => {
                self.status = BranchStatus::Merged;
                tracing::info!(branch = %self.branch, "Branch merged");
                Transition(State::merged())
            }
            BranchEvent::Abandon => {
                self.status = BranchStatus::Abandoned;
                tracing::info!(branch = %self.branch, "Branch abandoned");
                Transition(State::abandoned())
            }
        }
    }

    #[state]
    fn completed(&mut self, event: &BranchEvent) -> Outcome<State> {
        match event {
            BranchEvent::Merge => {
                self.status = BranchStatus::Merged;
                tracing::info!(branch = %self.branch, "Completed branch merged");
                Transition(State::merged())
            }
            _ => Handled,
        }
    }

    #[state]
    fn failed(&mut self, event: &BranchEvent) -> Outcome<State> {
        tracing::debug!(branch = %self.branch, event = ?event, "Ignoring event on failed branch");
        Handled
    }

    #[state]
    fn merged(&mut self, event: &BranchEvent) -> Outcome<State> {
        tracing::debug!(branch = %self.branch, event = ?event, "Ignoring event on merged branch");
        Handled
    }

    #[state]
    fn abandoned(&mut self, event: &BranchEvent) -> Outcome<State> {
        tracing::debug!(branch = %self.branch, event = ?event, "Ignoring event on abandoned branch");
        Handled
    }
}

/// A branch lifecycle with its event handling wired up
pub struct LifecycleMachine {
    machine: StateMachine<BranchLifecycle>,
}

impl LifecycleMachine {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            machine: BranchLifecycle::new(branch).state_machine(),
        }
    }

    pub fn handle(&mut self, event: BranchEvent) -> BranchStatus {
        self.machine.handle(&event);
        self.status()
    }

    pub fn status(&self) -> BranchStatus {
        self.machine.status()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.machine.failure_reason()
    }
}

impl fmt::Debug for LifecycleMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleMachine")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_to_completed_to_merged() {
        let mut lifecycle = LifecycleMachine::new("patchwright/x");
        assert_eq!(lifecycle.status(), BranchStatus::Active);

        assert_eq!(lifecycle.handle(BranchEvent::Complete), BranchStatus::Completed);
        assert_eq!(lifecycle.handle(BranchEvent::Merge), BranchStatus::Merged);
        assert!(lifecycle.status().is_terminal());
    }

    #[test]
    fn test_terminal_states_ignore_events() {
        let mut lifecycle = LifecycleMachine::new("patchwright/x");
        lifecycle.handle(BranchEvent::Fail {
            reason: "tests failed".to_string(),
        });
        assert_eq!(lifecycle.status(), BranchStatus::Failed);

        lifecycle.handle(BranchEvent::Merge);
        lifecycle.handle(BranchEvent::Complete);
        lifecycle.handle(BranchEvent::Abandon);
        assert_eq!(lifecycle.status(), BranchStatus::Failed);
        assert_eq!(lifecycle.failure_reason(), Some("tests failed"));
    }

    #[test]
    fn test_completed_only_moves_to_merged() {
        let mut lifecycle = LifecycleMachine::new("patchwright/x");
        lifecycle.handle(BranchEvent::Complete);
        lifecycle.handle(BranchEvent::Abandon);
        assert_eq!(lifecycle.status(), BranchStatus::Completed);
    }

    #[test]
    fn test_abandon_from_active() {
        let mut lifecycle = LifecycleMachine::new("patchwright/x");
        assert_eq!(lifecycle.handle(BranchEvent::Abandon), BranchStatus::Abandoned);
    }
}
