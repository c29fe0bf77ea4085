//! Acquisition state shared between an engine handle and its worker

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Acquisition state of a device engine
///
/// ```text
/// Idle ──init──► Initialized ──start──► Running ──stop──► Idle
///                                          │
///                                source failure
///                                          ▼
///                                        Error ──stop──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Initialized = 1,
    Running = 2,
    Error = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Initialized,
            2 => EngineState::Running,
            3 => EngineState::Error,
            _ => EngineState::Idle,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Initialized => write!(f, "initialized"),
            EngineState::Running => write!(f, "running"),
            EngineState::Error => write!(f, "error"),
        }
    }
}

/// State readable from any thread, written only by the worker
#[derive(Debug)]
pub(crate) struct SharedState {
    state: AtomicU8,
    last_error: Mutex<String>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Idle as u8),
            last_error: Mutex::new(String::new()),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store a new state, returning the previous one
    pub fn set_state(&self, state: EngineState) -> EngineState {
        EngineState::from_u8(self.state.swap(state as u8, Ordering::AcqRel))
    }

    pub fn last_error(&self) -> String {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_through_atomic() {
        let shared = SharedState::new();
        assert_eq!(shared.state(), EngineState::Idle);
        for state in [EngineState::Initialized, EngineState::Running, EngineState::Error, EngineState::Idle] {
            shared.set_state(state);
            assert_eq!(shared.state(), state);
        }
        assert_eq!(EngineState::Running.to_string(), "running");
    }
}
