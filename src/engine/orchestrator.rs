use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::consumer::run_consumer_loop;
use super::error::OrchestratorError;
use super::shared::{Shared, SharedParts};
use super::stats::StatsSnapshot;
use super::supervisor::run_supervisor_loop;
use super::tick::{run_tick_loop, TickOutcome};
use crate::config::AppConfig;
use crate::device::{NoController, PhysicalController, TracingPad, VirtualPad};
use crate::input::{InputEvent, MouseButton};
use crate::mapping::Profile;
use crate::mode::{
    ControllerPassHandler, JsonModeStore, Mode, ModeChange, ModeHandler, ModeService, ModeStore,
    NativeHandler, RawPassthroughHandler,
};
use crate::recoil::{AntiRecoilEngine, JsonPatternRepository, PatternRepository};
use crate::status::{ErrorKind, Status, StatusBoard};

/// Running task handles, each with its own token so shutdown can be ordered
struct Workers {
    tick_token: CancellationToken,
    consumer_token: CancellationToken,
    supervisor_token: CancellationToken,
    tick: JoinHandle<()>,
    consumer: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

impl Workers {
    fn spawn(shared: &Arc<Shared>, root: &CancellationToken) -> Self {
        let tick_token = root.child_token();
        let consumer_token = root.child_token();
        let supervisor_token = root.child_token();

        let supervisor = tokio::spawn(run_supervisor_loop(shared.clone(), supervisor_token.clone()));
        let consumer = tokio::spawn(run_consumer_loop(shared.clone(), consumer_token.clone()));
        let tick = tokio::spawn(run_tick_loop(shared.clone(), tick_token.clone()));

        Self {
            tick_token,
            consumer_token,
            supervisor_token,
            tick,
            consumer,
            supervisor,
        }
    }

    /// Timer first, then the consumer with a deadline, then the supervisor
    async fn shutdown(mut self, timeout: Duration) -> Result<(), OrchestratorError> {
        self.tick_token.cancel();
        if let Err(e) = self.tick.await {
            error!("Tick task ended abnormally: {}", e);
        }

        self.consumer_token.cancel();
        let consumer_result = match tokio::time::timeout(timeout, &mut self.consumer).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Input consumer ended abnormally: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!("Input consumer did not stop within {:?}, aborting", timeout);
                self.consumer.abort();
                Err(OrchestratorError::ShutdownTimeout(timeout))
            }
        };

        self.supervisor_token.cancel();
        if tokio::time::timeout(timeout, &mut self.supervisor).await.is_err() {
            warn!("Supervisor did not stop within {:?}, aborting", timeout);
            self.supervisor.abort();
        }
        consumer_result
    }
}

enum Lifecycle {
    Idle,
    Running(Workers),
    Disposed,
}

/// Owns the whole pipeline. Capture callbacks may call the `on_*` methods
/// from any thread; lifecycle methods are idempotent.
pub struct Orchestrator {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Connects the pad and spawns the consumer, tick and supervisor.
    /// Must be called inside a tokio runtime.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!("Orchestrator already running");
                return Ok(());
            }
            Lifecycle::Disposed => return Err(OrchestratorError::AlreadyDisposed),
            Lifecycle::Idle => {}
        }

        self.shared.connect_output();
        *lifecycle = Lifecycle::Running(Workers::spawn(&self.shared, &self.shutdown));
        info!(
            "Orchestrator started in {} mode",
            self.shared.modes.current_mode()
        );
        Ok(())
    }

    /// Stops the tasks, leaving the pad connected for a later `start`
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let workers = match std::mem::replace(&mut *lifecycle, Lifecycle::Idle) {
            Lifecycle::Running(workers) => workers,
            other => {
                *lifecycle = other;
                return Ok(());
            }
        };
        let result = workers
            .shutdown(self.shared.settings.shutdown_timeout())
            .await;
        info!("Orchestrator stopped");
        result
    }

    /// Stops if running and releases the pad. Later `start` calls fail.
    pub async fn dispose(&self) -> Result<(), OrchestratorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let result = match std::mem::replace(&mut *lifecycle, Lifecycle::Disposed) {
            Lifecycle::Disposed => return Ok(()),
            Lifecycle::Running(workers) => {
                workers
                    .shutdown(self.shared.settings.shutdown_timeout())
                    .await
            }
            Lifecycle::Idle => Ok(()),
        };
        self.shared.release_output();
        self.shutdown.cancel();
        info!("Orchestrator disposed");
        result
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running(_))
    }

    pub fn on_key(&self, vk: u16, down: bool) -> bool {
        self.submit_event(InputEvent::Key { vk, down })
    }

    pub fn on_mouse_move(&self, dx: i32, dy: i32) -> bool {
        self.submit_event(InputEvent::MouseMove { dx, dy })
    }

    pub fn on_mouse_button(&self, button: MouseButton, down: bool) -> bool {
        self.submit_event(InputEvent::MouseButton { button, down })
    }

    pub fn on_wheel(&self, delta: i32) -> bool {
        self.submit_event(InputEvent::Wheel { delta })
    }

    /// Returns whether the OS should swallow the event. Only hotkeys do work
    /// on the calling thread; everything else is a queue push.
    pub fn submit_event(&self, event: InputEvent) -> bool {
        self.shared.capture(event)
    }

    /// Runs one tick now, outside the timer
    pub fn tick_at(&self, now: Instant) -> TickOutcome {
        self.shared.run_tick(now)
    }

    pub fn modes(&self) -> &ModeService {
        &self.shared.modes
    }

    pub fn subscribe_modes(&self) -> broadcast::Receiver<ModeChange> {
        self.shared.modes.subscribe()
    }

    pub fn recoil(&self) -> &Arc<AntiRecoilEngine> {
        &self.shared.recoil
    }

    pub fn native(&self) -> &Arc<NativeHandler> {
        &self.shared.native
    }

    /// Validates and binds a new profile; the previous one stays on error
    pub fn bind_profile(&self, profile: Profile) -> Result<(), OrchestratorError> {
        self.shared.native.bind_profile(profile)?;
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared
            .stats
            .snapshot(self.shared.queue.dropped_count())
    }

    pub fn status(&self) -> Status {
        let active = self.shared.modes.active();
        Status {
            mode: active.mode,
            detail: active.handler.status_text(),
            output_connected: self.shared.output_healthy.load(Ordering::Acquire),
            physical_connected: self.shared.physical_connected.load(Ordering::Acquire),
            recoil: self.shared.recoil.snapshot(),
            dropped_events: self.shared.queue.dropped_count(),
            last_error: self.shared.status.last_error(),
        }
    }

    pub fn status_board(&self) -> &Arc<StatusBoard> {
        &self.shared.status
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Wires the orchestrator. Anything not supplied comes from the config:
/// a JSON mode file, a JSON pattern directory, the profile path if set, a
/// tracing pad and no physical controller.
pub struct OrchestratorBuilder {
    config: AppConfig,
    pad: Option<Box<dyn VirtualPad>>,
    physical: Option<Box<dyn PhysicalController>>,
    mode_store: Option<Box<dyn ModeStore>>,
    patterns: Option<Arc<dyn PatternRepository>>,
    profile: Option<Profile>,
    handlers: Vec<Arc<dyn ModeHandler>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            pad: None,
            physical: None,
            mode_store: None,
            patterns: None,
            profile: None,
            handlers: Vec::new(),
        }
    }

    pub fn pad(mut self, pad: impl VirtualPad + 'static) -> Self {
        self.pad = Some(Box::new(pad));
        self
    }

    pub fn physical(mut self, physical: impl PhysicalController + 'static) -> Self {
        self.physical = Some(Box::new(physical));
        self
    }

    pub fn mode_store(mut self, store: impl ModeStore + 'static) -> Self {
        self.mode_store = Some(Box::new(store));
        self
    }

    pub fn pattern_repository(mut self, repository: Arc<dyn PatternRepository>) -> Self {
        self.patterns = Some(repository);
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Replaces the built-in ControllerPass or MnKConvert handler. Native is
    /// always the built-in [`NativeHandler`].
    pub fn handler(mut self, handler: Arc<dyn ModeHandler>) -> Self {
        if handler.mode() == Mode::Native {
            warn!("Ignoring replacement Native handler");
        } else {
            self.handlers.push(handler);
        }
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let status = Arc::new(StatusBoard::new());
        let config = self.config;

        let settings = config.engine.clamped();
        if settings != config.engine {
            status.report(
                ErrorKind::ConfigurationOutOfRange,
                "engine settings clamped into range",
            );
        }
        if config.anti_recoil.clamped() != config.anti_recoil {
            status.report(
                ErrorKind::ConfigurationOutOfRange,
                "anti-recoil settings clamped into range",
            );
        }

        let profile = match (self.profile, &config.paths.profile) {
            (Some(profile), _) => profile,
            (None, Some(path)) => Profile::load(path)?,
            (None, None) => Profile::default_profile(),
        };
        profile.validate()?;

        let patterns = self.patterns.unwrap_or_else(|| {
            Arc::new(JsonPatternRepository::new(config.paths.pattern_dir.clone()))
        });
        let recoil = Arc::new(AntiRecoilEngine::new(config.anti_recoil.clone(), patterns));
        let native = Arc::new(NativeHandler::new(
            profile,
            recoil.clone(),
            settings.wheel_pulse_ticks,
        ));

        let mut handlers = vec![
            native.clone() as Arc<dyn ModeHandler>,
            Arc::new(ControllerPassHandler::new()) as Arc<dyn ModeHandler>,
            Arc::new(RawPassthroughHandler) as Arc<dyn ModeHandler>,
        ];
        // Later entries win when the service indexes by mode
        handlers.extend(self.handlers);

        let store = self
            .mode_store
            .unwrap_or_else(|| Box::new(JsonModeStore::new(config.paths.mode_file.clone())));
        let modes = ModeService::new(handlers, store, status.clone())?;

        let shared = Shared::new(SharedParts {
            settings,
            hotkeys: config.hotkeys,
            modes,
            native,
            recoil,
            pad: self.pad.unwrap_or_else(|| Box::new(TracingPad::new())),
            physical: self.physical.unwrap_or_else(|| Box::new(NoController)),
            status,
        });

        Ok(Orchestrator {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle::Idle),
            shutdown: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Buttons, ControllerStateBatch, MemoryPad, MemoryPadProbe, AXIS_MAX};
    use crate::input::vk;
    use crate::mode::{MemoryModeStore, ModeError, TickContext};
    use crate::recoil::InMemoryPatternRepository;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.paths = crate::config::PathSettings::under(std::path::Path::new("unused"));
        config
    }

    fn build_with(config: AppConfig) -> (Orchestrator, MemoryPadProbe) {
        let (pad, probe) = MemoryPad::new();
        let orchestrator = Orchestrator::builder(config)
            .pad(pad)
            .mode_store(MemoryModeStore::new())
            .pattern_repository(Arc::new(InMemoryPatternRepository::new()))
            .build()
            .unwrap();
        (orchestrator, probe)
    }

    /// Connected, but without the background tasks, so ticks are manual
    fn manual() -> (Orchestrator, MemoryPadProbe) {
        let (orchestrator, probe) = build_with(test_config());
        orchestrator.shared.connect_output();
        (orchestrator, probe)
    }

    fn pump(orchestrator: &Orchestrator) {
        let mut events = Vec::new();
        orchestrator.shared.queue.drain_into(&mut events);
        orchestrator.shared.apply_events(&events);
    }

    #[test]
    fn wasd_diagonal_reaches_full_scale() {
        let (orchestrator, probe) = manual();
        assert!(orchestrator.on_key(vk::W, true));
        assert!(orchestrator.on_key(vk::D, true));
        pump(&orchestrator);

        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
        let batch = probe.last().unwrap();
        assert!((batch.left_magnitude() - f64::from(AXIS_MAX)).abs() <= 1.0);
    }

    #[test]
    fn idle_mouse_recenters_right_stick() {
        let (orchestrator, probe) = manual();
        orchestrator.on_mouse_move(40, 0);
        pump(&orchestrator);
        let start = Instant::now();

        orchestrator.tick_at(start);
        assert!(probe.last().unwrap().right_x > 0);

        orchestrator.tick_at(start + Duration::from_millis(30));
        let batch = probe.last().unwrap();
        assert_eq!((batch.right_x, batch.right_y), (0, 0));
    }

    #[test]
    fn hotkeys_switch_modes_and_are_not_queued() {
        let (orchestrator, _probe) = manual();
        assert!(orchestrator.on_key(vk::F8, true));
        // Key repeat does not cycle again
        assert!(orchestrator.on_key(vk::F8, true));
        assert_eq!(orchestrator.modes().current_mode(), Mode::ControllerPass);
        orchestrator.on_key(vk::F8, false);

        orchestrator.on_key(vk::F8, true);
        assert_eq!(orchestrator.modes().current_mode(), Mode::MnKConvert);
        assert!(!orchestrator.on_key(vk::W, true));

        orchestrator.on_key(vk::F12, true);
        assert_eq!(orchestrator.modes().current_mode(), Mode::Native);
        assert_eq!(orchestrator.shared.queue.len(), 1);
    }

    #[test]
    fn overflow_drops_oldest_and_reports() {
        let mut config = test_config();
        config.engine.queue_capacity = 4;
        let (orchestrator, _probe) = build_with(config);

        for code in 0x41..0x4B {
            orchestrator.on_key(code, true);
        }
        assert_eq!(orchestrator.stats().events_dropped, 6);
        assert_eq!(
            orchestrator.status().last_error.unwrap().kind,
            ErrorKind::TransientInputDrop
        );

        pump(&orchestrator);
        let state = orchestrator.shared.input.lock();
        assert!(!state.keys.is_pressed(0x41));
        assert!(state.keys.is_pressed(0x4A));
    }

    #[test]
    fn busy_tick_is_skipped() {
        let (orchestrator, probe) = manual();
        orchestrator.shared.tick_in_flight.store(true, Ordering::SeqCst);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Skipped);
        assert_eq!(probe.submissions(), 0);

        orchestrator.shared.tick_in_flight.store(false, Ordering::SeqCst);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
        assert_eq!(orchestrator.stats().skipped, 1);
    }

    struct PanickingPass;

    impl ModeHandler for PanickingPass {
        fn mode(&self) -> Mode {
            Mode::ControllerPass
        }
        fn should_suppress_input(&self) -> bool {
            false
        }
        fn update(&self, ctx: &mut TickContext<'_>) -> Result<(), ModeError> {
            ctx.batch.buttons = Buttons::A;
            panic!("handler bug");
        }
        fn status_text(&self) -> String {
            "panicking".to_string()
        }
    }

    #[test]
    fn handler_panic_submits_neutral_and_keeps_ticking() {
        let (pad, probe) = MemoryPad::new();
        let orchestrator = Orchestrator::builder(test_config())
            .pad(pad)
            .mode_store(MemoryModeStore::new())
            .pattern_repository(Arc::new(InMemoryPatternRepository::new()))
            .handler(Arc::new(PanickingPass))
            .build()
            .unwrap();
        orchestrator.shared.connect_output();
        orchestrator.modes().switch(Mode::ControllerPass).unwrap();

        for _ in 0..3 {
            assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
        }
        assert_eq!(probe.last(), Some(ControllerStateBatch::NEUTRAL));
        assert_eq!(orchestrator.stats().failed, 3);
        assert!(!orchestrator.shared.tick_in_flight.load(Ordering::SeqCst));
    }

    /// Panics on one chosen poll, disconnected otherwise
    struct FlakyController {
        polls: usize,
        panic_on: usize,
    }

    impl crate::device::PhysicalController for FlakyController {
        fn poll(&mut self) -> crate::device::PhysicalPoll {
            self.polls += 1;
            if self.polls == self.panic_on {
                panic!("driver fault");
            }
            crate::device::PhysicalPoll::DISCONNECTED
        }
    }

    #[test]
    fn physical_poll_panic_fails_one_tick_only() {
        let (pad, probe) = MemoryPad::new();
        let orchestrator = Orchestrator::builder(test_config())
            .pad(pad)
            .physical(FlakyController {
                polls: 0,
                panic_on: 2,
            })
            .mode_store(MemoryModeStore::new())
            .pattern_repository(Arc::new(InMemoryPatternRepository::new()))
            .build()
            .unwrap();
        orchestrator.shared.connect_output();

        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Failed);
        assert!(!orchestrator.shared.tick_in_flight.load(Ordering::SeqCst));
        for _ in 0..3 {
            assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
        }
        assert_eq!(probe.submissions(), 4);
        assert_eq!(orchestrator.stats().failed, 1);
    }

    /// Pad whose submit panics
    struct PanickingPad;

    impl crate::device::VirtualPad for PanickingPad {
        fn connect(&mut self) -> Result<(), crate::device::OutputError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn submit(&mut self, _batch: &ControllerStateBatch) -> Result<(), crate::device::OutputError> {
            panic!("driver fault");
        }
        fn disconnect(&mut self) {}
    }

    #[test]
    fn pad_submit_panic_marks_output_failed() {
        let orchestrator = Orchestrator::builder(test_config())
            .pad(PanickingPad)
            .mode_store(MemoryModeStore::new())
            .pattern_repository(Arc::new(InMemoryPatternRepository::new()))
            .build()
            .unwrap();
        orchestrator.shared.connect_output();

        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Failed);
        assert!(!orchestrator.status().output_connected);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Withheld);
        assert!(!orchestrator.shared.pad.is_locked());
    }

    #[test]
    fn submit_failure_withholds_until_reconnected() {
        let (orchestrator, probe) = manual();
        probe.fail_submit(true);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Failed);
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Withheld);
        assert!(!orchestrator.status().output_connected);

        probe.fail_submit(false);
        orchestrator.shared.connect_output();
        assert_eq!(orchestrator.tick_at(Instant::now()), TickOutcome::Submitted);
    }

    #[test]
    fn invalid_profile_fails_the_build() {
        let mut profile = Profile::default_profile();
        profile.mouse_dpi = 0;
        let result = Orchestrator::builder(test_config())
            .mode_store(MemoryModeStore::new())
            .pattern_repository(Arc::new(InMemoryPatternRepository::new()))
            .profile(profile)
            .build();
        assert!(matches!(result, Err(OrchestratorError::Profile(_))));
    }

    #[test]
    fn clamped_config_is_reported() {
        let mut config = test_config();
        config.anti_recoil.strength = 4.0;
        let (orchestrator, _probe) = build_with(config);
        assert_eq!(
            orchestrator.status().last_error.unwrap().kind,
            ErrorKind::ConfigurationOutOfRange
        );
        assert_eq!(orchestrator.recoil().settings().strength, 1.0);
    }
}
