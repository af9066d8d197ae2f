//! Lifecycle state machine for one diagnosis execution.
//!
//! `Initializing → AiFetching → Analyzing → {Completed | PartialCompleted}`,
//! with `Failed` and `Timeout` reachable from any non-terminal state.
//! Transitions are monotonic: a terminal state never reverts, and invalid
//! transition requests are logged no-ops rather than errors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisState {
    Initializing,
    AiFetching,
    Analyzing,
    Completed,
    PartialCompleted,
    Failed,
    Timeout,
}

impl DiagnosisState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DiagnosisState::Completed
                | DiagnosisState::PartialCompleted
                | DiagnosisState::Failed
                | DiagnosisState::Timeout
        )
    }

    /// Whether `self → to` is a legal transition.
    #[must_use]
    pub fn can_transition(self, to: DiagnosisState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            DiagnosisState::Failed | DiagnosisState::Timeout => true,
            DiagnosisState::AiFetching => self == DiagnosisState::Initializing,
            DiagnosisState::Analyzing => self == DiagnosisState::AiFetching,
            DiagnosisState::Completed | DiagnosisState::PartialCompleted => {
                self == DiagnosisState::Analyzing
            }
            DiagnosisState::Initializing => false,
        }
    }
}

impl std::str::FromStr for DiagnosisState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(DiagnosisState::Initializing),
            "ai_fetching" => Ok(DiagnosisState::AiFetching),
            "analyzing" => Ok(DiagnosisState::Analyzing),
            "completed" => Ok(DiagnosisState::Completed),
            "partial_completed" => Ok(DiagnosisState::PartialCompleted),
            "failed" => Ok(DiagnosisState::Failed),
            "timeout" => Ok(DiagnosisState::Timeout),
            other => Err(format!("unknown diagnosis state: {other}")),
        }
    }
}

impl std::fmt::Display for DiagnosisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosisState::Initializing => "initializing",
            DiagnosisState::AiFetching => "ai_fetching",
            DiagnosisState::Analyzing => "analyzing",
            DiagnosisState::Completed => "completed",
            DiagnosisState::PartialCompleted => "partial_completed",
            DiagnosisState::Failed => "failed",
            DiagnosisState::Timeout => "timeout",
        };
        write!(f, "{name}")
    }
}
