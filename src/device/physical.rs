//! Physical controller polling

use std::sync::Arc;

use parking_lot::Mutex;

use super::state::ControllerStateBatch;

#[derive(Debug, thiserror::Error)]
pub enum PhysicalError {
    #[error("Failed to initialize controller backend: {0}")]
    InitializationError(String),
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalPoll {
    pub connected: bool,
    pub snapshot: ControllerStateBatch,
}

impl PhysicalPoll {
    pub const DISCONNECTED: PhysicalPoll = PhysicalPoll {
        connected: false,
        snapshot: ControllerStateBatch::NEUTRAL,
    };

    pub fn connected(snapshot: ControllerStateBatch) -> Self {
        Self {
            connected: true,
            snapshot,
        }
    }
}

pub trait PhysicalController: Send {
    /// Called once per tick, must not block
    fn poll(&mut self) -> PhysicalPoll;

    fn name(&self) -> &str {
        "physical controller"
    }
}

/// Stand-in when no physical controller backend is available
#[derive(Debug, Default)]
pub struct NoController;

impl PhysicalController for NoController {
    fn poll(&mut self) -> PhysicalPoll {
        PhysicalPoll::DISCONNECTED
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Controller whose state is pushed from elsewhere, e.g. a device watcher
/// thread or a test
#[derive(Debug, Default)]
pub struct ManualController {
    state: Arc<Mutex<PhysicalPoll>>,
}

#[derive(Debug, Clone)]
pub struct ManualControllerHandle {
    state: Arc<Mutex<PhysicalPoll>>,
}

impl ManualController {
    pub fn new() -> (Self, ManualControllerHandle) {
        let state = Arc::new(Mutex::new(PhysicalPoll::DISCONNECTED));
        (
            Self {
                state: state.clone(),
            },
            ManualControllerHandle { state },
        )
    }
}

impl ManualControllerHandle {
    pub fn connect(&self, snapshot: ControllerStateBatch) {
        *self.state.lock() = PhysicalPoll::connected(snapshot);
    }

    pub fn update(&self, snapshot: ControllerStateBatch) {
        self.state.lock().snapshot = snapshot;
    }

    pub fn disconnect(&self) {
        *self.state.lock() = PhysicalPoll::DISCONNECTED;
    }
}

impl PhysicalController for ManualController {
    fn poll(&mut self) -> PhysicalPoll {
        *self.state.lock()
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_controller_reflects_handle_updates() {
        let (mut controller, handle) = ManualController::new();
        assert_eq!(controller.poll(), PhysicalPoll::DISCONNECTED);

        let snapshot = ControllerStateBatch {
            left_x: 1200,
            ..ControllerStateBatch::NEUTRAL
        };
        handle.connect(snapshot);
        assert_eq!(controller.poll(), PhysicalPoll::connected(snapshot));

        handle.disconnect();
        assert!(!controller.poll().connected);
    }
}
