//! Module lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a module.
///
/// `Unloaded -> Ready -> ShuttingDown -> Finished`. A module stopped before
/// it became ready skips `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    Unloaded,
    Ready,
    ShuttingDown,
    Finished,
}

impl ModuleState {
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Unloaded, Ready) | (Unloaded, ShuttingDown) | (Ready, ShuttingDown) | (ShuttingDown, Finished)
        )
    }

    /// Whether the module processes events.
    pub fn is_running(self) -> bool {
        self == ModuleState::Ready
    }

    pub fn is_terminal(self) -> bool {
        self == ModuleState::Finished
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Ready => "ready",
            ModuleState::ShuttingDown => "shutting down",
            ModuleState::Finished => "finished",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error recorded on a module whose processing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFailure {
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ModuleFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.at.format("%H:%M:%S%.3f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModuleState::*;

    #[test]
    fn test_legal_transitions() {
        assert!(Unloaded.can_transition_to(Ready));
        assert!(Unloaded.can_transition_to(ShuttingDown));
        assert!(Ready.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Finished));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Ready.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Finished));
        assert!(!Finished.can_transition_to(Ready));
        assert!(!ShuttingDown.can_transition_to(Ready));
        assert!(!Unloaded.can_transition_to(Finished));
    }

    #[test]
    fn test_failure_display() {
        let failure = ModuleFailure::new("boom");
        assert!(failure.to_string().starts_with("boom (at "));
    }
}
