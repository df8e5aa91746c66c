//! Pipeline state management

use std::time::Instant;

/// Pipeline state machine
///
/// Represents the current state of a pipeline. State transitions are validated
/// so a pipeline can only move forward through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is registered but not yet producing buffers
    Created,

    /// Pipeline is actively producing media
    Started {
        /// When the pipeline started
        started_at: Instant,
    },

    /// Pipeline has stopped and cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            // From Created
            (Created, Started { .. }) => true,
            (Created, Stopped) => true, // Can tear down before starting

            // From Started
            (Started { .. }, Stopped) => true,

            // From Stopped - no transitions allowed
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Created => "Created",
            PipelineState::Started { .. } => "Started",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Check if the pipeline is running
    pub fn is_started(&self) -> bool {
        matches!(self, PipelineState::Started { .. })
    }

    /// Check if the pipeline has stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopped)
    }

    /// Get the duration since the pipeline started (if started)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Started { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let created = PipelineState::Created;
        let started = PipelineState::Started {
            started_at: Instant::now(),
        };
        let stopped = PipelineState::Stopped;

        // Valid transitions
        assert!(created.can_transition_to(&started));
        assert!(created.can_transition_to(&stopped));
        assert!(started.can_transition_to(&stopped));

        // Self-transitions
        assert!(created.can_transition_to(&created));
        assert!(started.can_transition_to(&started));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let created = PipelineState::Created;
        let started = PipelineState::Started {
            started_at: Instant::now(),
        };
        let stopped = PipelineState::Stopped;

        assert!(!stopped.can_transition_to(&created));
        assert!(!stopped.can_transition_to(&started));
        assert!(!started.can_transition_to(&created)); // No going back
    }

    #[test]
    fn test_state_checks() {
        let created = PipelineState::Created;
        let started = PipelineState::Started {
            started_at: Instant::now(),
        };
        let stopped = PipelineState::Stopped;

        assert!(!created.is_started());
        assert!(!created.is_stopped());

        assert!(started.is_started());
        assert!(!started.is_stopped());
        assert!(started.running_duration().is_some());

        assert!(!stopped.is_started());
        assert!(stopped.is_stopped());
        assert!(stopped.running_duration().is_none());
    }
}
