//! Virtual controller output
//!
//! The driver binding itself is external. Anything that can take a whole
//! [`ControllerStateBatch`] in one call can sit behind [`VirtualPad`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::state::ControllerStateBatch;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Virtual pad is not connected")]
    NotConnected,

    #[error("Failed to connect virtual pad: {0}")]
    ConnectFailed(String),

    #[error("Failed to submit controller state: {0}")]
    SubmitFailed(String),
}

pub trait VirtualPad: Send {
    fn connect(&mut self) -> Result<(), OutputError>;

    fn is_connected(&self) -> bool;

    /// Submits one complete snapshot. Implementations must not apply it partially.
    fn submit(&mut self, batch: &ControllerStateBatch) -> Result<(), OutputError>;

    fn disconnect(&mut self);

    fn name(&self) -> &str {
        "virtual pad"
    }
}

const DEFAULT_HISTORY: usize = 4096;

#[derive(Debug, Default)]
struct MemoryPadShared {
    history: Mutex<VecDeque<ControllerStateBatch>>,
    submissions: AtomicU64,
    connects: AtomicU64,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_submit: AtomicBool,
}

/// Observer and fault injector for a [`MemoryPad`]
#[derive(Debug, Clone, Default)]
pub struct MemoryPadProbe {
    shared: Arc<MemoryPadShared>,
}

impl MemoryPadProbe {
    pub fn last(&self) -> Option<ControllerStateBatch> {
        self.shared.history.lock().back().copied()
    }

    pub fn history(&self) -> Vec<ControllerStateBatch> {
        self.shared.history.lock().iter().copied().collect()
    }

    pub fn submissions(&self) -> u64 {
        self.shared.submissions.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submit(&self, fail: bool) {
        self.shared.fail_submit.store(fail, Ordering::SeqCst);
    }
}

/// Pad that keeps recent submissions in memory. Used for dry runs and tests.
#[derive(Debug)]
pub struct MemoryPad {
    probe: MemoryPadProbe,
    history_limit: usize,
}

impl MemoryPad {
    pub fn new() -> (Self, MemoryPadProbe) {
        let probe = MemoryPadProbe::default();
        (
            Self {
                probe: probe.clone(),
                history_limit: DEFAULT_HISTORY,
            },
            probe,
        )
    }
}

impl VirtualPad for MemoryPad {
    fn connect(&mut self) -> Result<(), OutputError> {
        let shared = &self.probe.shared;
        shared.connects.fetch_add(1, Ordering::SeqCst);
        if shared.fail_connect.load(Ordering::SeqCst) {
            shared.connected.store(false, Ordering::SeqCst);
            return Err(OutputError::ConnectFailed("memory pad refused".to_string()));
        }
        shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.probe.is_connected()
    }

    fn submit(&mut self, batch: &ControllerStateBatch) -> Result<(), OutputError> {
        let shared = &self.probe.shared;
        if !shared.connected.load(Ordering::SeqCst) {
            return Err(OutputError::NotConnected);
        }
        if shared.fail_submit.load(Ordering::SeqCst) {
            return Err(OutputError::SubmitFailed("memory pad refused".to_string()));
        }

        let mut history = shared.history.lock();
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(*batch);
        shared.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.probe.shared.connected.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "memory pad"
    }
}

/// Pad that only logs what it would have sent
#[derive(Debug, Default)]
pub struct TracingPad {
    connected: bool,
    last: Option<ControllerStateBatch>,
    submissions: u64,
}

impl TracingPad {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VirtualPad for TracingPad {
    fn connect(&mut self) -> Result<(), OutputError> {
        info!("Tracing pad connected");
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn submit(&mut self, batch: &ControllerStateBatch) -> Result<(), OutputError> {
        if !self.connected {
            return Err(OutputError::NotConnected);
        }
        self.submissions += 1;
        // Only changes are interesting at debug level
        if self.last.as_ref() != Some(batch) {
            debug!("Pad state changed: {}", batch.summary());
            self.last = Some(*batch);
        } else {
            trace!("Pad state: {}", batch.summary());
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            info!("Tracing pad disconnected after {} submissions", self.submissions);
        } else {
            warn!("Tracing pad disconnect requested while not connected");
        }
        self.connected = false;
    }

    fn name(&self) -> &str {
        "tracing pad"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pad_requires_connection() {
        let (mut pad, probe) = MemoryPad::new();
        assert!(matches!(
            pad.submit(&ControllerStateBatch::NEUTRAL),
            Err(OutputError::NotConnected)
        ));

        pad.connect().unwrap();
        pad.submit(&ControllerStateBatch::NEUTRAL).unwrap();
        assert_eq!(probe.submissions(), 1);
        assert_eq!(probe.last(), Some(ControllerStateBatch::NEUTRAL));
    }

    #[test]
    fn memory_pad_fault_injection() {
        let (mut pad, probe) = MemoryPad::new();
        probe.fail_connect(true);
        assert!(pad.connect().is_err());
        assert!(!pad.is_connected());

        probe.fail_connect(false);
        pad.connect().unwrap();
        probe.fail_submit(true);
        assert!(matches!(
            pad.submit(&ControllerStateBatch::NEUTRAL),
            Err(OutputError::SubmitFailed(_))
        ));
        assert_eq!(probe.connects(), 2);
    }

    #[test]
    fn tracing_pad_counts_submissions() {
        let mut pad = TracingPad::new();
        pad.connect().unwrap();
        pad.submit(&ControllerStateBatch::NEUTRAL).unwrap();
        pad.submit(&ControllerStateBatch::NEUTRAL).unwrap();
        assert_eq!(pad.submissions, 2);
        pad.disconnect();
        assert!(!pad.is_connected());
    }
}
