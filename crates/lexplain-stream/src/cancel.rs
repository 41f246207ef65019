//! Cooperative cancellation for in-flight turns.
//!
//! The caller holds a [`TurnHandle`]; the drive loop holds a clone of its
//! token and checks it each time a network read resolves. Dropping the handle
//! cancels, so results of reads already issued are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assembler::TurnId;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Caller's claim on a running turn. Dropping it abandons the turn.
#[derive(Debug)]
pub struct TurnHandle {
    id: TurnId,
    token: CancellationToken,
}

impl TurnHandle {
    pub(crate) fn new(id: TurnId, token: CancellationToken) -> Self {
        Self { id, token }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TurnHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
