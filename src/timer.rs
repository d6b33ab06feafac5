use std::time::Duration;

use crate::object::{Function, Object};
use crate::value::Value;

/// A scheduled callback created by `setInterval`/`setTimeout`.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    function: Function,
    this: Option<Object>,
    args: Vec<Value>,
    interval: Duration,
    repeat: bool,
    last: Duration,
    cleared: bool,
}

impl IntervalTimer {
    pub fn new(function: Function, interval: Duration) -> Self {
        Self {
            function,
            this: None,
            args: Vec::new(),
            interval,
            repeat: true,
            last: Duration::ZERO,
            cleared: false,
        }
    }

    pub fn with_this(mut self, this: Object) -> Self {
        self.this = Some(this);
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Fire once and then stay cleared.
    pub fn once(mut self) -> Self {
        self.repeat = false;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }
}

/// Everything needed to invoke a timer callback once the timer list lock
/// has been released.
#[derive(Debug, Clone)]
pub struct TimerCall {
    pub function: Function,
    pub this: Option<Object>,
    pub args: Vec<Value>,
}

/// Index-addressed timer storage. Entries are never removed, so handed-out
/// ids stay valid for the lifetime of the runtime.
#[derive(Debug, Default)]
pub struct TimerList {
    timers: Vec<IntervalTimer>,
    clock: Duration,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `timer` and returns its 1-based id.
    pub fn add(&mut self, mut timer: IntervalTimer) -> u32 {
        timer.last = self.clock;
        self.timers.push(timer);
        self.timers.len() as u32
    }

    /// Cancels a timer for good. Returns false for ids that were never
    /// handed out.
    pub fn clear(&mut self, id: u32) -> bool {
        let Some(timer) = (id as usize)
            .checked_sub(1)
            .and_then(|index| self.timers.get_mut(index))
        else {
            return false;
        };
        timer.cleared = true;
        true
    }

    pub fn is_active(&self, id: u32) -> bool {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.timers.get(index))
            .is_some_and(|timer| !timer.cleared)
    }

    pub fn advance_clock(&mut self, delta: Duration) {
        self.clock += delta;
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Checks the timer stored at `index` (0-based) and returns its call if
    /// the interval has elapsed, restarting the interval.
    pub fn poll(&mut self, index: usize) -> Option<TimerCall> {
        let clock = self.clock;
        let timer = self.timers.get_mut(index)?;
        if timer.cleared || clock.saturating_sub(timer.last) < timer.interval {
            return None;
        }
        timer.last = clock;
        if !timer.repeat {
            timer.cleared = true;
        }
        Some(TimerCall {
            function: timer.function.clone(),
            this: timer.this.clone(),
            args: timer.args.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
