// Software PWM for two H-bridges
//
// A free-running phase counter walks [0, period). On every tick each bridge
// renders its wheel command into two line levels: the line selected by the
// direction is high while counter < duty threshold, the other line stays low.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::gpio::OutputLine;
use super::kinematics::{Direction, WheelCommand, WheelPair};

const FORWARD: usize = 0;
const BACKWARD: usize = 1;

/// The two inputs of one H-bridge, [forward, backward]
pub struct BridgeLines {
    lines: [Box<dyn OutputLine>; 2],
    applied: [bool; 2],
    failing: [bool; 2],
}

impl BridgeLines {
    /// Both lines are assumed to start low
    pub fn new(forward: Box<dyn OutputLine>, backward: Box<dyn OutputLine>) -> Self {
        Self {
            lines: [forward, backward],
            applied: [false; 2],
            failing: [false; 2],
        }
    }

    /// Last level successfully written to each line
    pub fn applied(&self) -> [bool; 2] {
        self.applied
    }

    /// Drive the lines toward `desired`, lowering before raising.
    /// Returns the number of lines left diverged from `desired`.
    fn apply(&mut self, desired: [bool; 2]) -> u64 {
        let mut diverged = 0;

        for i in [FORWARD, BACKWARD] {
            if !desired[i] && self.applied[i] {
                diverged += self.write(i, false);
            }
        }

        for i in [FORWARD, BACKWARD] {
            if desired[i] && !self.applied[i] {
                // Never raise a line while its partner is still high
                if self.applied[1 - i] {
                    diverged += 1;
                } else {
                    diverged += self.write(i, true);
                }
            }
        }

        diverged
    }

    fn write(&mut self, i: usize, high: bool) -> u64 {
        match self.lines[i].set(high) {
            Ok(()) => {
                self.applied[i] = high;
                self.failing[i] = false;
                0
            }
            Err(e) => {
                if !self.failing[i] {
                    warn!("PWM line write failed, holding last level: {}", e);
                } else {
                    debug!("PWM line still failing: {}", e);
                }
                self.failing[i] = true;
                1
            }
        }
    }
}

/// Renders wheel commands into bridge line levels, one phase step per tick
pub struct SoftwarePwm {
    period: u32,
    counter: u32,
    bridges: [BridgeLines; 2],
    divergence: Arc<AtomicU64>,
}

impl SoftwarePwm {
    /// `bridges` is [left, right]
    pub fn new(period: u32, bridges: [BridgeLines; 2]) -> Self {
        Self {
            period: period.max(1),
            counter: 0,
            bridges,
            divergence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cumulative count of line writes that left physical != logical state
    pub fn divergence_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.divergence)
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn applied(&self) -> [[bool; 2]; 2] {
        [self.bridges[0].applied(), self.bridges[1].applied()]
    }

    /// Render one phase step for both bridges and advance the counter
    pub fn tick(&mut self, commands: &WheelPair) {
        let mut diverged = 0;
        for (bridge, command) in self.bridges.iter_mut().zip(commands) {
            let desired = render_levels(command, self.counter, self.period);
            diverged += bridge.apply(desired);
        }
        if diverged > 0 {
            self.divergence.fetch_add(diverged, Ordering::Relaxed);
        }
        self.counter = (self.counter + 1) % self.period;
    }

    /// Drive every line low
    pub fn release(&mut self) {
        for bridge in &mut self.bridges {
            let diverged = bridge.apply([false; 2]);
            if diverged > 0 {
                self.divergence.fetch_add(diverged, Ordering::Relaxed);
            }
        }
    }
}

/// Line levels [forward, backward] for one bridge at a given phase
pub fn render_levels(command: &WheelCommand, counter: u32, period: u32) -> [bool; 2] {
    if command.is_idle() {
        return [false; 2];
    }
    let threshold = u32::from(command.duty.min(100)) * period / 100;
    let high = counter < threshold;
    match command.direction {
        Direction::Forward => [high, false],
        Direction::Backward => [false, high],
        Direction::Stop => [false; 2],
    }
}
