//! Serialized, persisted mode transitions

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::handler::ModeHandler;
use super::store::ModeStore;
use super::{Mode, ModeChange, ModeError, PersistenceError};
use crate::status::{ErrorKind, StatusBoard};

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// The mode the tick sees, swapped as one unit
#[derive(Clone)]
pub struct ActiveMode {
    pub mode: Mode,
    pub handler: Arc<dyn ModeHandler>,
}

impl fmt::Debug for ActiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveMode").field("mode", &self.mode).finish()
    }
}

/// Owns the registered handlers and the active mode.
///
/// `switch` may be called from any thread. One lock covers the hooks, the
/// persistence write and the swap, so concurrent callers are serialized and
/// readers of [`active`](Self::active) see either the old or the new mode.
pub struct ModeService {
    handlers: HashMap<Mode, Arc<dyn ModeHandler>>,
    active: RwLock<ActiveMode>,
    transition: Mutex<()>,
    store: Box<dyn ModeStore>,
    changes: broadcast::Sender<ModeChange>,
    status: Arc<StatusBoard>,
}

impl fmt::Debug for ModeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.handlers.keys().collect();
        registered.sort_by_key(|mode| Mode::ALL.iter().position(|m| m == *mode));
        f.debug_struct("ModeService")
            .field("active", &*self.active.read())
            .field("registered", &registered)
            .finish_non_exhaustive()
    }
}

impl ModeService {
    /// Registers the handlers and restores the persisted mode.
    ///
    /// A missing, corrupt or unregistered persisted mode starts in Native.
    pub fn new(
        handlers: impl IntoIterator<Item = Arc<dyn ModeHandler>>,
        store: Box<dyn ModeStore>,
        status: Arc<StatusBoard>,
    ) -> Result<Self, ModeError> {
        let handlers: HashMap<Mode, Arc<dyn ModeHandler>> = handlers
            .into_iter()
            .map(|handler| (handler.mode(), handler))
            .collect();
        let native = handlers
            .get(&Mode::Native)
            .cloned()
            .ok_or(ModeError::NativeMissing)?;

        let restored = match store.load() {
            Ok(Some(mode)) if handlers.contains_key(&mode) => mode,
            Ok(Some(mode)) => {
                warn!("Persisted mode {} is not registered, starting in Native", mode);
                Mode::Native
            }
            Ok(None) => Mode::Native,
            Err(e @ PersistenceError::Corrupt { .. }) => {
                status.report(ErrorKind::PersistenceCorrupt, e.to_string());
                Mode::Native
            }
            Err(e) => {
                warn!("Failed to read persisted mode, starting in Native: {}", e);
                Mode::Native
            }
        };

        let mut active = ActiveMode {
            mode: restored,
            handler: handlers.get(&restored).cloned().unwrap_or_else(|| native.clone()),
        };
        if let Err(e) = active.handler.on_entered(None) {
            error!("Failed to enter restored mode {}: {}", restored, e);
            active = ActiveMode {
                mode: Mode::Native,
                handler: native,
            };
            if let Err(e) = active.handler.on_entered(None) {
                error!("Native handler failed to start: {}", e);
            }
        }
        info!("Mode service started in {}", active.mode);

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            handlers,
            active: RwLock::new(active),
            transition: Mutex::new(()),
            store,
            changes,
            status,
        })
    }

    pub fn current_mode(&self) -> Mode {
        self.active.read().mode
    }

    /// Snapshot for the tick: mode and handler always belong together
    pub fn active(&self) -> ActiveMode {
        self.active.read().clone()
    }

    pub fn is_registered(&self, mode: Mode) -> bool {
        self.handlers.contains_key(&mode)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModeChange> {
        self.changes.subscribe()
    }

    /// All-or-nothing switch. Switching to the current mode is a no-op.
    pub fn switch(&self, target: Mode) -> Result<ModeChange, ModeError> {
        let _transition = self.transition.lock();
        self.switch_locked(target)
    }

    /// Moves to the next registered mode in cycle order
    pub fn toggle(&self) -> Result<ModeChange, ModeError> {
        let _transition = self.transition.lock();
        let current = self.current_mode();
        let mut target = current.next();
        while target != current && !self.is_registered(target) {
            target = target.next();
        }
        self.switch_locked(target)
    }

    /// Forced return to Native after an output failure
    pub fn fallback_to_native(&self, reason: &str) -> Result<ModeChange, ModeError> {
        self.status
            .report(ErrorKind::OutputDeviceUnavailable, reason.to_string());
        self.switch(Mode::Native)
    }

    /// Panic hotkey
    pub fn panic_to_native(&self) -> Result<ModeChange, ModeError> {
        info!("Panic hotkey: forcing Native");
        self.switch(Mode::Native)
    }

    /// Automatic ControllerPass when a pad shows up while in Native
    pub fn on_physical_controller_connected(&self) -> Result<Option<ModeChange>, ModeError> {
        let _transition = self.transition.lock();
        if self.current_mode() != Mode::Native || !self.is_registered(Mode::ControllerPass) {
            return Ok(None);
        }
        info!("Physical controller connected, switching to ControllerPass");
        self.switch_locked(Mode::ControllerPass).map(Some)
    }

    fn reject(&self, error: ModeError) -> ModeError {
        self.status
            .report(ErrorKind::ModeTransitionRejected, error.to_string());
        error
    }

    fn switch_locked(&self, target: Mode) -> Result<ModeChange, ModeError> {
        let current = self.active();
        let Some(next) = self.handlers.get(&target).cloned() else {
            return Err(self.reject(ModeError::Unregistered(target)));
        };
        if current.mode == target {
            debug!("Already in {}", target);
            return Ok(ModeChange {
                previous: target,
                current: target,
            });
        }

        if let Err(e) = current.handler.on_exited(target) {
            return Err(self.reject(e));
        }
        if let Err(e) = next.on_entered(Some(current.mode)) {
            self.reenter(&current, target);
            return Err(self.reject(e));
        }
        if let Err(e) = self.store.save(target) {
            if let Err(exit_error) = next.on_exited(current.mode) {
                warn!("{} did not exit cleanly: {}", target, exit_error);
            }
            self.reenter(&current, target);
            return Err(self.reject(ModeError::Persistence(e)));
        }

        *self.active.write() = ActiveMode {
            mode: target,
            handler: next,
        };
        let change = ModeChange {
            previous: current.mode,
            current: target,
        };
        info!("Mode changed: {} -> {}", change.previous, change.current);
        // Nobody listening is fine
        let _ = self.changes.send(change);
        Ok(change)
    }

    fn reenter(&self, previous: &ActiveMode, attempted: Mode) {
        if let Err(e) = previous.handler.on_entered(Some(attempted)) {
            error!("Failed to re-enter {}: {}", previous.mode, e);
        }
    }
}
