use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use statum::{machine, state};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::shared::Shared;
use crate::device::{ControllerStateBatch, PhysicalPoll};
use crate::input::InputFrame;
use crate::mode::{ActiveMode, Mode, TickContext};

/// What one call to the tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Submitted,
    /// The pad was busy reconnecting or is marked failed
    Withheld,
    /// Another tick was still running
    Skipped,
    /// The submit call failed or the tick panicked outside the handler
    Failed,
}

/// Everything sampled at tick start
#[derive(Debug, Clone)]
pub struct TickInput {
    now: Instant,
    frame: InputFrame,
    physical: PhysicalPoll,
    active: ActiveMode,
}

#[derive(Debug, Clone)]
pub struct TickOutput {
    mode: Mode,
    batch: ControllerStateBatch,
}

#[state]
#[derive(Debug, Clone)]
pub enum TickPhase {
    Sampling,
    Mapping(TickInput),
    Submitting(TickOutput),
}

#[machine]
#[derive(Debug)]
pub struct TickCycle<S: TickPhase> {
    shared: Arc<Shared>,
}

impl TickCycle<Sampling> {
    fn begin(shared: Arc<Shared>) -> Self {
        Self::new(shared)
    }

    /// Copies the folded input and polls the physical pad
    fn sample(self, now: Instant) -> TickCycle<Mapping> {
        let shared = &self.shared;
        let frame = shared.input.sample(
            now,
            shared.settings.mouse_decay,
            shared.settings.idle_timeout(),
        );
        let physical = shared.poll_physical();
        let active = shared.modes.active();

        self.transition_with(TickInput {
            now,
            frame,
            physical,
            active,
        })
    }
}

impl TickCycle<Mapping> {
    /// Runs the active handler. Errors and panics yield a neutral snapshot.
    fn map(self) -> TickCycle<Submitting> {
        let Some(input) = self.get_state_data().cloned() else {
            warn!("Tick reached mapping without input, submitting neutral");
            return self.transition_with(TickOutput {
                mode: Mode::Native,
                batch: ControllerStateBatch::NEUTRAL,
            });
        };

        let mode = input.active.mode;
        let mut batch = ControllerStateBatch::NEUTRAL;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            input.active.handler.update(&mut TickContext {
                now: input.now,
                frame: &input.frame,
                physical: &input.physical,
                batch: &mut batch,
            })
        }));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shared.stats.tick_failed();
                warn!("{} update failed: {}", mode, e);
                batch = ControllerStateBatch::NEUTRAL;
            }
            Err(payload) => {
                self.shared.stats.tick_failed();
                error!("{} update panicked: {}", mode, panic_message(payload.as_ref()));
                batch = ControllerStateBatch::NEUTRAL;
            }
        }

        // Compensation only runs in Native, but the budget keeps decaying
        if mode != Mode::Native {
            self.shared.recoil.idle_tick(input.now);
        }

        self.transition_with(TickOutput { mode, batch })
    }
}

impl TickCycle<Submitting> {
    fn submit(self) -> TickOutcome {
        let Some(output) = self.get_state_data().cloned() else {
            warn!("Tick reached submit without a snapshot");
            return TickOutcome::Withheld;
        };
        let shared = &self.shared;

        if !shared.output_healthy.load(Ordering::Acquire) {
            shared.stats.tick_withheld();
            return TickOutcome::Withheld;
        }
        let Some(mut pad) = shared.pad.try_lock() else {
            shared.stats.tick_withheld();
            return TickOutcome::Withheld;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| pad.submit(&output.batch)));
        drop(pad);

        let reason = match result {
            Ok(Ok(())) => {
                shared.stats.tick_submitted();
                trace!("{} tick: {}", output.mode, output.batch.summary());
                return TickOutcome::Submitted;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("submit panicked: {}", panic_message(payload.as_ref())),
        };
        shared.stats.tick_failed();
        shared.output_failed(reason);
        TickOutcome::Failed
    }
}

/// Clears the single-flight flag even if the tick unwinds
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    /// One tick. A tick that finds another still running is skipped.
    pub(super) fn run_tick(self: &Arc<Self>, now: Instant) -> TickOutcome {
        if self.tick_in_flight.swap(true, Ordering::AcqRel) {
            self.stats.tick_skipped();
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.tick_in_flight);
        self.stats.tick_started();

        let cycle = || TickCycle::begin(self.clone()).sample(now).map().submit();
        match panic::catch_unwind(AssertUnwindSafe(cycle)) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.stats.tick_failed();
                error!("Tick panicked: {}", panic_message(payload.as_ref()));
                TickOutcome::Failed
            }
        }
    }
}

pub(super) async fn run_tick_loop(shared: Arc<Shared>, token: CancellationToken) {
    let period = shared.settings.tick_period();
    info!("Starting tick loop with {} us period", period.as_micros());

    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = timer.tick() => {}
        }
        shared.run_tick(Instant::now());
    }
    info!("Tick loop stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
