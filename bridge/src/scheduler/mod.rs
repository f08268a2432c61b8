//! Program scheduler
//!
//! Runs a program's valves one after another. Each step switches a valve on
//! and waits its configured duration plus one second before moving on; the
//! controller switches the previous valve off by itself when its run time
//! ends.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::models::ProgramDefinition;

/// Extra wait after each valve's duration
pub const STEP_SLACK: Duration = Duration::from_secs(1);

/// Wait before a program without valves reports completion
pub const EMPTY_PROGRAM_DELAY: Duration = Duration::from_secs(1);

/// What a running program needs from its device
pub trait ProgramHost {
    /// Configured run time of a valve in seconds
    fn valve_duration(&self, relay: u8) -> Option<u32>;

    fn set_valve_active(&mut self, relay: u8, active: bool);

    /// Deliver a timer event tagged with `generation` after `delay`
    fn arm_timer(&mut self, subtype: &str, generation: u64, delay: Duration) -> TimerHandle;

    /// The program is no longer running; its switch reads off
    fn program_stopped(&mut self, subtype: &str);
}

/// Cancellation handle of a pending step timer
#[derive(Debug)]
pub struct TimerHandle(Option<AbortHandle>);

impl TimerHandle {
    pub fn new(handle: AbortHandle) -> Self {
        Self(Some(handle))
    }

    /// A timer with nothing to cancel
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn cancel(self) {
        if let Some(handle) = self.0 {
            handle.abort();
        }
    }
}

/// Run state of a program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running {
        current: Option<u8>,
        queue: VecDeque<u8>,
    },
}

/// One program on one device
#[derive(Debug)]
pub struct ProgramScheduler {
    definition: ProgramDefinition,
    state: RunState,
    timer: Option<TimerHandle>,
    generation: u64,
}

impl ProgramScheduler {
    pub fn new(definition: ProgramDefinition) -> Self {
        Self {
            definition,
            state: RunState::Idle,
            timer: None,
            generation: 0,
        }
    }

    pub fn definition(&self) -> &ProgramDefinition {
        &self.definition
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    pub fn current_valve(&self) -> Option<u8> {
        match &self.state {
            RunState::Running { current, .. } => *current,
            RunState::Idle => None,
        }
    }

    /// Valves still waiting their turn
    pub fn pending(&self) -> Vec<u8> {
        match &self.state {
            RunState::Running { queue, .. } => queue.iter().copied().collect(),
            RunState::Idle => Vec::new(),
        }
    }

    /// Start the program; returns false if it was already running
    pub fn start(&mut self, host: &mut dyn ProgramHost) -> bool {
        if self.is_running() {
            debug!("Program {} already running", self.definition.name);
            return false;
        }

        info!("Starting program {}", self.definition.name);
        self.state = RunState::Running {
            current: None,
            queue: self.definition.solenoids.iter().copied().collect(),
        };

        if self.definition.is_empty() {
            self.arm(host, EMPTY_PROGRAM_DELAY);
        } else {
            self.advance(host);
        }
        true
    }

    /// Stop the program, switching off the valve it is currently running
    pub fn stop(&mut self, host: &mut dyn ProgramHost) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation += 1;

        if let RunState::Running {
            current: Some(relay),
            ..
        } = self.state
        {
            host.set_valve_active(relay, false);
        }
        if self.is_running() {
            info!("Program {} terminated", self.definition.name);
        }
        self.state = RunState::Idle;
        host.program_stopped(&self.definition.subtype);
    }

    /// Handle an expired step timer
    pub fn on_timer(&mut self, generation: u64, host: &mut dyn ProgramHost) {
        if generation != self.generation || !self.is_running() {
            debug!(
                "Ignoring stale timer {} for program {}",
                generation, self.definition.name
            );
            return;
        }
        self.timer = None;
        self.advance(host);
    }

    fn advance(&mut self, host: &mut dyn ProgramHost) {
        let RunState::Running { current, queue } = &mut self.state else {
            return;
        };

        let Some(relay) = queue.pop_front() else {
            self.finish(host);
            return;
        };
        *current = Some(relay);

        let duration = host.valve_duration(relay).unwrap_or_else(|| {
            warn!("Program {} references unknown valve {}", self.definition.name, relay);
            0
        });
        info!(
            "Program {}: running valve {} for {}s",
            self.definition.name, relay, duration
        );
        host.set_valve_active(relay, true);
        self.arm(host, Duration::from_secs(u64::from(duration)) + STEP_SLACK);
    }

    fn finish(&mut self, host: &mut dyn ProgramHost) {
        info!("Program {} finished", self.definition.name);
        self.state = RunState::Idle;
        self.timer = None;
        host.program_stopped(&self.definition.subtype);
    }

    fn arm(&mut self, host: &mut dyn ProgramHost, delay: Duration) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation += 1;
        self.timer = Some(host.arm_timer(&self.definition.subtype, self.generation, delay));
    }
}
