//! Trailing-delay coalescing of description edits.
//!
//! Editing a step's description re-derives its recommended task binding,
//! and that propagation must not fire per keystroke. Each step keeps at
//! most one pending edit; a new edit restarts the quiet period. The policy
//! is pure state over injected instants, so callers (and tests) control
//! time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::step::StepId;

/// Default quiet period before an edit propagates.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// A description edit whose quiet period has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub step_id: StepId,
    pub description: String,
}

/// Per-step trailing debouncer.
#[derive(Debug)]
pub struct EditDebouncer {
    delay: Duration,
    pending: HashMap<StepId, (String, Instant)>,
}

impl EditDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Record an edit, restarting the step's quiet period.
    pub fn note(&mut self, step_id: StepId, description: impl Into<String>, now: Instant) {
        self.pending.insert(step_id, (description.into(), now));
    }

    /// Drop the pending edit for a step (deleted or reset).
    pub fn clear(&mut self, step_id: StepId) {
        self.pending.remove(&step_id);
    }

    /// Drop all pending edits.
    pub fn clear_all(&mut self) {
        self.pending.clear();
    }

    /// Take every edit whose quiet period has elapsed.
    pub fn drain_due(&mut self, now: Instant) -> Vec<PendingEdit> {
        let delay = self.delay;
        let due: Vec<StepId> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= delay)
            .map(|(id, _)| *id)
            .collect();
        due.into_iter()
            .filter_map(|id| {
                self.pending.remove(&id).map(|(description, _)| PendingEdit {
                    step_id: id,
                    description,
                })
            })
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for EditDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
