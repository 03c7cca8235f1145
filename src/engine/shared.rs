use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::stats::EngineStats;
use super::supervisor::SupervisorRequest;
use crate::config::{EngineSettings, HotkeySettings};
use crate::device::{PhysicalController, PhysicalPoll, VirtualPad};
use crate::input::{EnqueueOutcome, EventQueue, InputEvent, QueuedEvent, SharedInput};
use crate::mode::{ModeHandler, ModeService, NativeHandler};
use crate::recoil::AntiRecoilEngine;
use crate::status::{ErrorKind, StatusBoard};

const CYCLE_HOTKEY: usize = 0;
const PANIC_HOTKEY: usize = 1;

/// State reachable from every task and from capture callbacks
pub struct Shared {
    pub(super) settings: EngineSettings,
    pub(super) hotkeys: HotkeySettings,
    pub(super) queue: EventQueue,
    pub(super) input: SharedInput,
    pub(super) modes: ModeService,
    pub(super) native: Arc<NativeHandler>,
    pub(super) recoil: Arc<AntiRecoilEngine>,
    pub(super) pad: Mutex<Box<dyn VirtualPad>>,
    pub(super) physical: Mutex<Box<dyn PhysicalController>>,
    pub(super) status: Arc<StatusBoard>,
    pub(super) stats: EngineStats,
    pub(super) tick_in_flight: AtomicBool,
    pub(super) output_healthy: AtomicBool,
    pub(super) physical_connected: AtomicBool,
    pub(super) requests_rx: tokio::sync::Mutex<mpsc::Receiver<SupervisorRequest>>,
    requests: mpsc::Sender<SupervisorRequest>,
    hotkey_held: [AtomicBool; 2],
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("mode", &self.modes.current_mode())
            .field("queued", &self.queue.len())
            .field("output_healthy", &self.output_healthy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

pub(super) struct SharedParts {
    pub settings: EngineSettings,
    pub hotkeys: HotkeySettings,
    pub modes: ModeService,
    pub native: Arc<NativeHandler>,
    pub recoil: Arc<AntiRecoilEngine>,
    pub pad: Box<dyn VirtualPad>,
    pub physical: Box<dyn PhysicalController>,
    pub status: Arc<StatusBoard>,
}

impl Shared {
    pub(super) fn new(parts: SharedParts) -> Self {
        let (requests, requests_rx) = mpsc::channel(super::supervisor::REQUEST_CAPACITY);
        Self {
            queue: EventQueue::new(parts.settings.queue_capacity),
            settings: parts.settings,
            hotkeys: parts.hotkeys,
            input: SharedInput::new(),
            modes: parts.modes,
            native: parts.native,
            recoil: parts.recoil,
            pad: Mutex::new(parts.pad),
            physical: Mutex::new(parts.physical),
            status: parts.status,
            stats: EngineStats::default(),
            tick_in_flight: AtomicBool::new(false),
            output_healthy: AtomicBool::new(false),
            physical_connected: AtomicBool::new(false),
            requests_rx: tokio::sync::Mutex::new(requests_rx),
            requests,
            hotkey_held: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Capture entry point. Returns whether the OS event should be swallowed.
    pub(super) fn capture(&self, event: InputEvent) -> bool {
        if let InputEvent::Key { vk, down } = event {
            if let Some(slot) = self.hotkey_slot(vk) {
                self.hotkey(slot, down);
                return true;
            }
        }

        if self.queue.enqueue(event) == EnqueueOutcome::DroppedOldest {
            let dropped = self.queue.dropped_count();
            if dropped == 1 || dropped % 256 == 0 {
                self.status.report(
                    ErrorKind::TransientInputDrop,
                    format!("{} input events dropped", dropped),
                );
            }
        }
        self.modes.active().handler.should_suppress_input()
    }

    fn hotkey_slot(&self, vk: u16) -> Option<usize> {
        if vk == self.hotkeys.cycle_mode {
            Some(CYCLE_HOTKEY)
        } else if vk == self.hotkeys.panic {
            Some(PANIC_HOTKEY)
        } else {
            None
        }
    }

    /// Acts on the press edge only, so key repeat does not re-trigger
    fn hotkey(&self, slot: usize, down: bool) {
        let was_down = self.hotkey_held[slot].swap(down, Ordering::AcqRel);
        if !down || was_down {
            return;
        }
        let result = if slot == CYCLE_HOTKEY {
            self.modes.toggle()
        } else {
            self.modes.panic_to_native()
        };
        if let Err(e) = result {
            warn!("Hotkey mode change failed: {}", e);
        }
    }

    /// Folds events through the active handler. Only the consumer calls this.
    pub(super) fn apply_events(&self, events: &[QueuedEvent]) {
        let handler = self.modes.active().handler;
        for queued in events {
            apply_event(handler.as_ref(), &self.input, queued);
        }
        self.stats.events_applied(events.len());
    }

    pub(super) fn poll_physical(&self) -> PhysicalPoll {
        let poll = self.physical.lock().poll();
        let was_connected = self.physical_connected.swap(poll.connected, Ordering::AcqRel);
        if poll.connected && !was_connected {
            self.request(SupervisorRequest::PhysicalConnected);
        } else if !poll.connected && was_connected {
            info!("Physical controller disconnected");
        }
        poll
    }

    /// Connects the pad if needed. A failure is handed to the supervisor.
    pub(super) fn connect_output(&self) {
        let mut pad = self.pad.lock();
        if pad.is_connected() {
            self.output_healthy.store(true, Ordering::Release);
            return;
        }
        match pad.connect() {
            Ok(()) => {
                info!("Connected {}", pad.name());
                self.output_healthy.store(true, Ordering::Release);
            }
            Err(e) => {
                drop(pad);
                self.output_healthy.store(false, Ordering::Release);
                self.request(SupervisorRequest::OutputFailed(e.to_string()));
            }
        }
    }

    /// Only the healthy -> failed edge produces a request
    pub(super) fn output_failed(&self, reason: String) {
        if self.output_healthy.swap(false, Ordering::AcqRel) {
            error!("Virtual pad failure: {}", reason);
            self.request(SupervisorRequest::OutputFailed(reason));
        } else {
            debug!("Virtual pad still failing: {}", reason);
        }
    }

    pub(super) fn release_output(&self) {
        let mut pad = self.pad.lock();
        if pad.is_connected() {
            pad.disconnect();
            info!("Released {}", pad.name());
        }
        self.output_healthy.store(false, Ordering::Release);
    }

    fn request(&self, request: SupervisorRequest) {
        if let Err(e) = self.requests.try_send(request) {
            warn!("Supervisor request dropped: {}", e);
        }
    }
}

fn apply_event(handler: &dyn ModeHandler, input: &SharedInput, queued: &QueuedEvent) {
    let mut state = input.lock();
    match queued.event {
        InputEvent::Key { vk, down } => handler.on_key(&mut state, vk, down),
        InputEvent::MouseMove { dx, dy } => {
            handler.on_mouse_move(&mut state, dx, dy, queued.enqueued_at)
        }
        InputEvent::MouseButton { button, down } => {
            handler.on_mouse_button(&mut state, button, down)
        }
        InputEvent::Wheel { delta } => handler.on_wheel(&mut state, delta),
    }
}
