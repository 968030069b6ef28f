use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Cycle de vie d'un driver de découverte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Binding,
    Listening,
    Stopped,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverState::Idle => "idle",
            DriverState::Binding => "binding",
            DriverState::Listening => "listening",
            DriverState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// État partagé entre le handle du driver et son thread
#[derive(Clone)]
pub(crate) struct StateCell(Arc<Mutex<DriverState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(DriverState::Idle)))
    }

    pub(crate) fn get(&self) -> DriverState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: DriverState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
