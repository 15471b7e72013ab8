//! Processing state machine
//!
//! At most one render is in flight per engine. `Idle -> Rendering` succeeds
//! only when nothing is rendering; a request arriving meanwhile is rejected
//! with [`FxError::RenderInProgress`], never queued. Leaving `Rendering`
//! happens when the [`RenderTicket`] is settled or dropped. The ticket is
//! owned, so it can travel with the render worker: a caller that abandons a
//! render does not release the machine before the worker has returned.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingState {
    #[default]
    Idle,
    Rendering,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Idle => write!(f, "Idle"),
            ProcessingState::Rendering => write!(f, "Rendering"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessingStateMachine {
    rendering: Arc<AtomicBool>,
}

impl ProcessingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProcessingState {
        if self.rendering.load(Ordering::Acquire) {
            ProcessingState::Rendering
        } else {
            ProcessingState::Idle
        }
    }

    /// Transition `Idle -> Rendering`
    pub fn try_begin(&self) -> Result<RenderTicket> {
        self.rendering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("Render rejected: already rendering");
                FxError::RenderInProgress
            })?;
        debug!(from = %ProcessingState::Idle, to = %ProcessingState::Rendering, "State transition");
        Ok(RenderTicket {
            rendering: self.rendering.clone(),
            settled: false,
        })
    }
}

/// Proof that a render holds the machine; returns it to `Idle` when settled
#[derive(Debug)]
pub struct RenderTicket {
    rendering: Arc<AtomicBool>,
    settled: bool,
}

impl RenderTicket {
    pub fn succeed(mut self) {
        self.finish("success");
    }

    pub fn fail(mut self) {
        self.finish("failure");
    }

    fn finish(&mut self, outcome: &str) {
        self.settled = true;
        self.rendering.store(false, Ordering::Release);
        debug!(
            from = %ProcessingState::Rendering,
            to = %ProcessingState::Idle,
            outcome,
            "State transition"
        );
    }
}

impl Drop for RenderTicket {
    fn drop(&mut self) {
        if !self.settled {
            self.finish("abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_rejected() {
        let machine = ProcessingStateMachine::new();
        let ticket = machine.try_begin().unwrap();
        assert_eq!(machine.state(), ProcessingState::Rendering);
        let err = machine.try_begin().unwrap_err();
        assert_eq!(err.error_code(), "RENDER_IN_PROGRESS");
        ticket.succeed();
        assert_eq!(machine.state(), ProcessingState::Idle);
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let machine = ProcessingStateMachine::new();
        machine.try_begin().unwrap().fail();
        assert_eq!(machine.state(), ProcessingState::Idle);
        assert!(machine.try_begin().is_ok());
    }

    #[test]
    fn test_dropped_ticket_returns_to_idle() {
        let machine = ProcessingStateMachine::new();
        {
            let _ticket = machine.try_begin().unwrap();
        }
        assert_eq!(machine.state(), ProcessingState::Idle);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessingState::Rendering.to_string(), "Rendering");
    }

    #[test]
    fn test_ticket_outlives_its_thread() {
        let machine = ProcessingStateMachine::new();
        let ticket = machine.try_begin().unwrap();
        let worker = std::thread::spawn(move || ticket);
        assert_eq!(machine.state(), ProcessingState::Rendering);
        let ticket = worker.join().unwrap();
        assert_eq!(machine.state(), ProcessingState::Rendering);
        drop(ticket);
        assert_eq!(machine.state(), ProcessingState::Idle);
    }
}
