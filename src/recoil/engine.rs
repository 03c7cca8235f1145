//! Live anti-recoil engine driven once per tick

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use super::formula::{compensate, Compensated};
use super::pattern::{
    validate_name, AntiRecoilPattern, InMemoryPatternRepository, PatternError, PatternRepository,
    Sample,
};
use super::settings::AntiRecoilSettings;
use super::simulate::{simulate, SimulationResult};

const ADAPTIVE_WINDOW: usize = 32;
const ADAPTIVE_MAX_STEP: f64 = 0.05;
const ADAPTIVE_HALF_POINT: f64 = 10.0;
const ADAPTIVE_MIN_INTERVAL_MS: f64 = 100.0;
const SETTINGS_CHANNEL_CAPACITY: usize = 16;

/// Upper bound on phase changes evaluated in one tick
const MAX_PHASE_STEPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Waiting,
    Active,
    Cooldown,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Waiting => "waiting",
            CyclePhase::Active => "active",
            CyclePhase::Cooldown => "cooldown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CooldownCause {
    Released,
    CapReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Idle,
    Waiting { since: Instant },
    Active,
    Cooldown { since: Instant, cause: CooldownCause },
}

impl Cycle {
    fn phase(self) -> CyclePhase {
        match self {
            Cycle::Idle => CyclePhase::Idle,
            Cycle::Waiting { .. } => CyclePhase::Waiting,
            Cycle::Active => CyclePhase::Active,
            Cycle::Cooldown { .. } => CyclePhase::Cooldown,
        }
    }
}

/// Point-in-time view of the engine for status and tests
#[derive(Debug, Clone, PartialEq)]
pub struct AntiRecoilSnapshot {
    pub enabled: bool,
    pub phase: CyclePhase,
    pub is_active: bool,
    pub accumulated_compensation: f64,
    pub last_applied_compensation: f64,
    pub effective_strength: f64,
    pub recording: Option<String>,
    pub recorded_samples: usize,
}

#[derive(Debug)]
struct LiveState {
    cycle: Cycle,
    accumulated: f64,
    last_applied: f64,
    is_active: bool,
    last_tick: Option<Instant>,
    effective_strength: f64,
    recent_dy: VecDeque<f64>,
    last_adjustment: Option<Instant>,
    recording: Option<AntiRecoilPattern>,
}

fn elapsed_ms(since: Instant, now: Instant) -> f64 {
    now.saturating_duration_since(since).as_nanos() as f64 / 1.0e6
}

impl LiveState {
    fn new(strength: f64) -> Self {
        Self {
            cycle: Cycle::Idle,
            accumulated: 0.0,
            last_applied: 0.0,
            is_active: false,
            last_tick: None,
            effective_strength: strength,
            recent_dy: VecDeque::with_capacity(ADAPTIVE_WINDOW),
            last_adjustment: None,
            recording: None,
        }
    }

    fn decay(&mut self, now: Instant, decay_per_ms: f64) {
        if let Some(last) = self.last_tick {
            let spent = decay_per_ms * elapsed_ms(last, now);
            self.accumulated = (self.accumulated - spent).max(0.0);
        }
        self.last_tick = Some(now);
    }

    fn go_idle(&mut self) {
        self.cycle = Cycle::Idle;
        self.is_active = false;
        self.last_applied = 0.0;
    }

    fn advance(&mut self, fire_held: bool, now: Instant, settings: &AntiRecoilSettings) {
        for _ in 0..MAX_PHASE_STEPS {
            let next = match self.cycle {
                Cycle::Idle if fire_held => Cycle::Waiting { since: now },
                Cycle::Idle => break,
                Cycle::Waiting { .. } if !fire_held => Cycle::Idle,
                Cycle::Waiting { since } => {
                    if elapsed_ms(since, now) >= settings.activation_delay_ms {
                        Cycle::Active
                    } else {
                        break;
                    }
                }
                Cycle::Active if !fire_held => Cycle::Cooldown {
                    since: now,
                    cause: CooldownCause::Released,
                },
                Cycle::Active => break,
                Cycle::Cooldown { since, cause } => {
                    if elapsed_ms(since, now) < settings.cooldown_ms {
                        break;
                    }
                    match (cause, fire_held) {
                        (CooldownCause::CapReached, true) => Cycle::Active,
                        (CooldownCause::Released, true) => Cycle::Waiting { since: now },
                        (_, false) => {
                            // Cycle complete
                            self.accumulated = 0.0;
                            Cycle::Idle
                        }
                    }
                }
            };
            trace!("Recoil cycle {:?} -> {:?}", self.cycle.phase(), next.phase());
            self.cycle = next;
        }
    }

    fn adapt(&mut self, dy: f64, now: Instant, settings: &AntiRecoilSettings) {
        if self.recent_dy.len() == ADAPTIVE_WINDOW {
            self.recent_dy.pop_front();
        }
        self.recent_dy.push_back(dy.abs());

        let Some(last) = self.last_adjustment else {
            self.last_adjustment = Some(now);
            return;
        };
        let window = settings.cooldown_ms.max(ADAPTIVE_MIN_INTERVAL_MS);
        if elapsed_ms(last, now) < window {
            return;
        }

        let average = self.recent_dy.iter().sum::<f64>() / self.recent_dy.len() as f64;
        let target = average / (average + ADAPTIVE_HALF_POINT);
        let step = (target - self.effective_strength).clamp(-ADAPTIVE_MAX_STEP, ADAPTIVE_MAX_STEP);
        self.effective_strength = (self.effective_strength + step).clamp(0.0, 1.0);
        self.last_adjustment = Some(now);
        debug!(
            "Adaptive strength now {:.3} (avg |dy| {:.2})",
            self.effective_strength, average
        );
    }
}

/// Mutates mouse deltas while fire is held and manages recoil patterns.
///
/// Settings are read by the tick and written by management calls; the tick
/// takes the read side with `read_recursive` so writers cannot starve it.
pub struct AntiRecoilEngine {
    settings: RwLock<AntiRecoilSettings>,
    live: Mutex<LiveState>,
    repository: Arc<dyn PatternRepository>,
    changes: broadcast::Sender<AntiRecoilSettings>,
}

impl fmt::Debug for AntiRecoilEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AntiRecoilEngine")
            .field("settings", &*self.settings.read_recursive())
            .field("live", &*self.live.lock())
            .finish_non_exhaustive()
    }
}

impl AntiRecoilEngine {
    pub fn new(settings: AntiRecoilSettings, repository: Arc<dyn PatternRepository>) -> Self {
        let settings = settings.clamped();
        let (changes, _) = broadcast::channel(SETTINGS_CHANNEL_CAPACITY);
        info!(
            "Anti-recoil engine ready (enabled: {}, strength: {:.2})",
            settings.enabled, settings.strength
        );
        Self {
            live: Mutex::new(LiveState::new(settings.strength)),
            settings: RwLock::new(settings),
            repository,
            changes,
        }
    }

    pub fn in_memory(settings: AntiRecoilSettings) -> Self {
        Self::new(settings, Arc::new(InMemoryPatternRepository::new()))
    }

    /// One Native-mode tick. Returns the deltas the curve mapper should see.
    pub fn process(&self, dx: f64, dy: f64, fire_held: bool, now: Instant) -> Compensated {
        let settings = self.settings.read_recursive().clone();
        let mut live = self.live.lock();

        live.decay(now, settings.decay_per_ms);
        if fire_held {
            if let Some(recording) = live.recording.as_mut() {
                recording.samples.push(Sample::new(dx, dy));
            }
        }

        if !settings.enabled {
            live.go_idle();
            return Compensated::passthrough(dx, dy);
        }

        live.advance(fire_held, now, &settings);
        if live.cycle != Cycle::Active {
            live.is_active = false;
            live.last_applied = 0.0;
            return Compensated::passthrough(dx, dy);
        }

        let out = compensate(dx, dy, live.effective_strength, &settings, live.accumulated);
        live.accumulated += out.compensation_y;
        live.last_applied = out.compensation_y;
        live.is_active = true;

        if settings.adaptive_compensation && dy.abs() >= settings.vertical_threshold {
            live.adapt(dy, now, &settings);
        }

        let budget = settings.max_total_compensation;
        if budget > 0.0 {
            live.accumulated = live.accumulated.min(budget);
            if live.accumulated >= budget {
                debug!("Compensation budget {:.1} exhausted, cooling down", budget);
                live.cycle = Cycle::Cooldown {
                    since: now,
                    cause: CooldownCause::CapReached,
                };
            }
        }

        trace!(
            "Recoil dy {:.2} -> {:.2} (accumulated {:.2})",
            dy,
            out.dy,
            live.accumulated
        );
        out
    }

    /// Keeps time moving while another mode owns the tick
    pub fn idle_tick(&self, now: Instant) {
        let decay_per_ms = self.settings.read_recursive().decay_per_ms;
        let mut live = self.live.lock();
        live.decay(now, decay_per_ms);
        live.go_idle();
    }

    /// Drops the current cycle and budget
    pub fn reset(&self) {
        let strength = self.settings.read_recursive().strength;
        let mut live = self.live.lock();
        let recording = live.recording.take();
        *live = LiveState::new(strength);
        live.recording = recording;
    }

    pub fn snapshot(&self) -> AntiRecoilSnapshot {
        let enabled = self.settings.read_recursive().enabled;
        let live = self.live.lock();
        AntiRecoilSnapshot {
            enabled,
            phase: live.cycle.phase(),
            is_active: live.is_active,
            accumulated_compensation: live.accumulated,
            last_applied_compensation: live.last_applied,
            effective_strength: live.effective_strength,
            recording: live.recording.as_ref().map(|p| p.name.clone()),
            recorded_samples: live.recording.as_ref().map_or(0, |p| p.samples.len()),
        }
    }

    pub fn settings(&self) -> AntiRecoilSettings {
        self.settings.read_recursive().clone()
    }

    /// Replaces the settings; subscribers are notified after the lock is released
    pub fn update_settings(&self, settings: AntiRecoilSettings) {
        let settings = settings.clamped();
        {
            let mut current = self.settings.write();
            *current = settings.clone();
        }
        {
            let mut live = self.live.lock();
            live.effective_strength = settings.strength;
            live.recent_dy.clear();
            live.last_adjustment = None;
            if !settings.enabled {
                live.go_idle();
            }
        }
        info!(
            "Anti-recoil settings updated (enabled: {}, strength: {:.2})",
            settings.enabled, settings.strength
        );
        // No subscribers is fine
        let _ = self.changes.send(settings);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AntiRecoilSettings> {
        self.changes.subscribe()
    }

    pub fn start_pattern_recording(&self, name: &str) -> Result<(), PatternError> {
        validate_name(name)?;
        let mut live = self.live.lock();
        if let Some(active) = &live.recording {
            return Err(PatternError::AlreadyRecording(active.name.clone()));
        }
        live.recording = Some(AntiRecoilPattern::new(name));
        info!("Recording recoil pattern '{}'", name);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.live.lock().recording.is_some()
    }

    /// Finishes the recording; the pattern goes to the repository when `save` is set
    pub fn stop_pattern_recording(&self, save: bool) -> Result<AntiRecoilPattern, PatternError> {
        let pattern = self
            .live
            .lock()
            .recording
            .take()
            .ok_or(PatternError::NotRecording)?;
        info!(
            "Stopped recording '{}' with {} samples",
            pattern.name,
            pattern.samples.len()
        );
        if save {
            self.repository.save(&pattern)?;
        }
        Ok(pattern)
    }

    pub fn add_pattern(&self, pattern: &AntiRecoilPattern) -> Result<(), PatternError> {
        validate_name(&pattern.name)?;
        if self.repository.load(&pattern.name)?.is_some() {
            return Err(PatternError::AlreadyExists(pattern.name.clone()));
        }
        self.repository.save(pattern)
    }

    pub fn rename_pattern(&self, old: &str, new: &str) -> Result<(), PatternError> {
        self.repository.rename(old, new)
    }

    pub fn delete_pattern(&self, name: &str) -> Result<(), PatternError> {
        if self.repository.delete(name)? {
            Ok(())
        } else {
            Err(PatternError::NotFound(name.to_string()))
        }
    }

    pub fn load_pattern(&self, name: &str) -> Result<AntiRecoilPattern, PatternError> {
        self.repository
            .load(name)?
            .ok_or_else(|| PatternError::NotFound(name.to_string()))
    }

    pub fn list_patterns(&self) -> Result<Vec<String>, PatternError> {
        self.repository.list()
    }

    /// Replays samples against the current settings without touching live state
    pub fn simulate(&self, samples: &[Sample]) -> SimulationResult {
        let settings = self.settings();
        simulate(samples, &settings)
    }

    pub fn simulate_named(&self, name: &str) -> Result<SimulationResult, PatternError> {
        let pattern = self.load_pattern(name)?;
        Ok(self.simulate(&pattern.samples))
    }
}

/// How long after release the budget takes to drain completely
pub fn recovery_interval(settings: &AntiRecoilSettings, accumulated: f64) -> Duration {
    let settings = settings.clamped();
    let decay_ms = if settings.decay_per_ms > 0.0 {
        accumulated.max(0.0) / settings.decay_per_ms
    } else {
        0.0
    };
    Duration::from_secs_f64((settings.cooldown_ms + decay_ms) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TICK: Duration = Duration::from_millis(2);

    fn enabled() -> AntiRecoilSettings {
        AntiRecoilSettings {
            enabled: true,
            strength: 0.5,
            vertical_threshold: 1.0,
            activation_delay_ms: 0.0,
            cooldown_ms: 10.0,
            decay_per_ms: 0.0,
            ..AntiRecoilSettings::default()
        }
    }

    #[test]
    fn disabled_engine_passes_through() {
        let engine = AntiRecoilEngine::in_memory(AntiRecoilSettings::default());
        let out = engine.process(1.0, 10.0, true, Instant::now());
        assert_eq!(out, Compensated::passthrough(1.0, 10.0));
        assert_eq!(engine.snapshot().phase, CyclePhase::Idle);
    }

    #[test]
    fn activation_waits_for_the_delay() {
        let engine = AntiRecoilEngine::in_memory(AntiRecoilSettings {
            activation_delay_ms: 30.0,
            ..enabled()
        });
        let start = Instant::now();

        assert_eq!(engine.process(0.0, 10.0, true, start).dy, 10.0);
        assert_eq!(engine.snapshot().phase, CyclePhase::Waiting);
        assert_eq!(
            engine.process(0.0, 10.0, true, start + Duration::from_millis(20)).dy,
            10.0
        );
        assert_eq!(
            engine.process(0.0, 10.0, true, start + Duration::from_millis(30)).dy,
            5.0
        );
        assert!(engine.snapshot().is_active);
    }

    #[test]
    fn release_cools_down_then_resets_budget() {
        let engine = AntiRecoilEngine::in_memory(enabled());
        let start = Instant::now();
        engine.process(0.0, 10.0, true, start);
        assert_eq!(engine.snapshot().accumulated_compensation, 5.0);

        engine.process(0.0, 0.0, false, start + TICK);
        assert_eq!(engine.snapshot().phase, CyclePhase::Cooldown);

        // Re-pressing during cooldown does not compensate
        assert_eq!(engine.process(0.0, 10.0, true, start + 2 * TICK).dy, 10.0);
        engine.process(0.0, 0.0, false, start + 3 * TICK);

        engine.process(0.0, 0.0, false, start + Duration::from_millis(20));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, CyclePhase::Idle);
        assert_eq!(snapshot.accumulated_compensation, 0.0);
    }

    #[test]
    fn budget_cap_is_never_exceeded() {
        let engine = AntiRecoilEngine::in_memory(AntiRecoilSettings {
            max_total_compensation: 12.0,
            ..enabled()
        });
        let start = Instant::now();
        let mut total = 0.0;
        for i in 0..50u32 {
            let out = engine.process(0.0, 10.0, true, start + TICK * i);
            total += out.compensation_y;
            assert!(engine.snapshot().accumulated_compensation <= 12.0);
        }
        assert_eq!(total, 12.0);
    }

    #[test]
    fn decay_recovers_budget_over_time() {
        let settings = AntiRecoilSettings {
            decay_per_ms: 0.5,
            ..enabled()
        };
        let engine = AntiRecoilEngine::in_memory(settings.clone());
        let start = Instant::now();
        engine.process(0.0, 10.0, true, start);
        engine.process(0.0, 0.0, false, start + TICK);
        let remaining = engine.snapshot().accumulated_compensation;
        assert_eq!(remaining, 4.0);

        let later = start + TICK + recovery_interval(&settings, remaining);
        engine.process(0.0, 0.0, false, later);
        assert_eq!(engine.snapshot().accumulated_compensation, 0.0);
    }

    #[test]
    fn adaptive_strength_moves_slowly_and_stays_in_range() {
        let engine = AntiRecoilEngine::in_memory(AntiRecoilSettings {
            adaptive_compensation: true,
            strength: 0.1,
            cooldown_ms: 0.0,
            ..enabled()
        });
        let start = Instant::now();
        let mut previous = engine.snapshot().effective_strength;
        for i in 0..200u32 {
            engine.process(0.0, 40.0, true, start + Duration::from_millis(50) * i);
            let strength = engine.snapshot().effective_strength;
            assert!((0.0..=1.0).contains(&strength));
            assert!((strength - previous).abs() <= ADAPTIVE_MAX_STEP + 1e-12);
            previous = strength;
        }
        // avg 40 -> target 0.8
        assert!((previous - 0.8).abs() < 1e-9, "strength {previous}");
        assert_eq!(engine.settings().strength, 0.1);
    }

    #[test]
    fn recording_captures_raw_deltas_while_firing() {
        let engine = AntiRecoilEngine::in_memory(enabled());
        let start = Instant::now();
        engine.start_pattern_recording("spray").unwrap();
        assert!(matches!(
            engine.start_pattern_recording("other"),
            Err(PatternError::AlreadyRecording(_))
        ));

        // Recording stores raw deltas and does not suppress compensation
        let out = engine.process(1.0, 10.0, true, start);
        assert_eq!(out.dy, 5.0);
        assert_eq!(out.compensation_y, 5.0);
        engine.process(5.0, 5.0, false, start + TICK);
        engine.process(-1.0, 8.0, true, start + 2 * TICK);

        let pattern = engine.stop_pattern_recording(true).unwrap();
        assert_eq!(
            pattern.samples,
            vec![Sample::new(1.0, 10.0), Sample::new(-1.0, 8.0)]
        );
        assert_eq!(engine.list_patterns().unwrap(), vec!["spray".to_string()]);
        assert!(matches!(
            engine.stop_pattern_recording(false),
            Err(PatternError::NotRecording)
        ));
    }

    #[test]
    fn simulation_does_not_touch_live_state() {
        let engine = AntiRecoilEngine::in_memory(enabled());
        engine
            .add_pattern(&AntiRecoilPattern::with_samples(
                "p",
                [Sample::new(0.0, 10.0), Sample::new(0.0, 6.0)],
            ))
            .unwrap();
        let before = engine.snapshot();
        let result = engine.simulate_named("p").unwrap();
        assert_eq!(result.total_output_dy, 8.0);
        assert_eq!(engine.snapshot(), before);
        assert!(matches!(
            engine.simulate_named("missing"),
            Err(PatternError::NotFound(_))
        ));
    }

    #[test]
    fn settings_updates_are_broadcast() {
        let engine = AntiRecoilEngine::in_memory(enabled());
        let mut changes = engine.subscribe();
        engine.update_settings(AntiRecoilSettings {
            strength: 3.0,
            ..enabled()
        });
        assert_eq!(changes.try_recv().unwrap().strength, 1.0);
        assert_eq!(engine.snapshot().effective_strength, 1.0);
    }
}
