//! Iteration and wall-clock caps for lexing and boundary scans.
//!
//! Every loop that walks template text ticks a [`Budget`]. Exhaustion means
//! "stop and keep what you have"; cancellation means "unwind now".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock reads are spaced out; a tick is otherwise a counter bump and a relaxed load.
const CLOCK_CHECK_INTERVAL: u64 = 256;

/// Cooperative cancellation flag shared between the editor and a background pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Step or time limit reached.
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Budget {
    steps: u64,
    max_steps: u64,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Budget {
    pub fn new(max_steps: u64, timeout: Option<Duration>, cancel: Option<CancelToken>) -> Self {
        Self {
            steps: 0,
            max_steps,
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX, None, None)
    }

    /// A fresh budget for one sub-scan, sharing the cancel flag and never
    /// outliving this budget's deadline.
    pub fn child(&self, max_steps: u64, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            steps: 0,
            max_steps,
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    pub fn tick(&mut self) -> Result<(), Interrupt> {
        self.steps += 1;
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Interrupt::Cancelled);
        }
        if self.steps > self.max_steps {
            return Err(Interrupt::Exhausted);
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0
            && self.deadline.is_some_and(|d| Instant::now() >= d)
        {
            return Err(Interrupt::Exhausted);
        }
        Ok(())
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unlimited()
    }
}
