//! Engine health tracking
//!
//! INIT -> RUNNING on the first healthy cycle; RUNNING -> DEGRADED after
//! `threshold` consecutive unhealthy cycles; DEGRADED -> RUNNING on the next
//! healthy cycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Init,
    Running,
    Degraded,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState::Init
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Init => write!(f, "INIT"),
            EngineState::Running => write!(f, "RUNNING"),
            EngineState::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Observability snapshot pushed after every cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub state: EngineState,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub failed_cycles: u64,
    /// Number of RUNNING -> DEGRADED transitions
    pub degraded_entries: u64,
    pub last_error: Option<String>,
    /// Rolling accuracy fraction
    pub accuracy: f64,
    pub updated_at: i64,
}

/// A state change caused by the latest cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: EngineState,
    pub to: EngineState,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    snapshot: HealthSnapshot,
    threshold: u32,
}

impl HealthTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            snapshot: HealthSnapshot::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn state(&self) -> EngineState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &HealthSnapshot {
        &self.snapshot
    }

    fn move_to(&mut self, to: EngineState) -> Option<Transition> {
        let from = self.snapshot.state;
        if from == to {
            return None;
        }
        self.snapshot.state = to;
        if to == EngineState::Degraded {
            self.snapshot.degraded_entries += 1;
        }
        Some(Transition { from, to })
    }

    pub fn record_success(&mut self, accuracy: f64) -> Option<Transition> {
        self.snapshot.cycles += 1;
        self.snapshot.consecutive_failures = 0;
        self.snapshot.accuracy = accuracy;
        self.snapshot.updated_at = chrono::Utc::now().timestamp_millis();
        self.move_to(EngineState::Running)
    }

    pub fn record_failure(&mut self, error: String, accuracy: f64) -> Option<Transition> {
        self.snapshot.cycles += 1;
        self.snapshot.failed_cycles += 1;
        self.snapshot.consecutive_failures += 1;
        self.snapshot.last_error = Some(error);
        self.snapshot.accuracy = accuracy;
        self.snapshot.updated_at = chrono::Utc::now().timestamp_millis();
        if self.snapshot.consecutive_failures >= self.threshold {
            self.move_to(EngineState::Degraded)
        } else {
            None
        }
    }
}
