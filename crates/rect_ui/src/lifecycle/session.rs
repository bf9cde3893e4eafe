//! Bulk construction sessions
//!
//! While a session is open, hierarchy events and lifecycle calls for nodes
//! tagged with it are parked in the session's queue. Ending the session
//! hands the queue back in FIFO order.

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{BehaviourKey, SessionId};
use crate::hierarchy::Notification;

/// Work parked until its session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Hierarchy event
    Event(Notification),
    /// `awake` of a newly added behaviour
    Awake(BehaviourKey),
    /// `on_enable` of a newly added behaviour, if its node is active by then
    Enable(BehaviourKey),
}

/// Open sessions and their queues
#[derive(Debug, Default)]
pub struct BulkSessions {
    open: Vec<(SessionId, Vec<Deferred>)>,
}

impl BulkSessions {
    /// Create with no open session
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session
    pub fn begin(&mut self, id: SessionId) -> UiResult<()> {
        if self.is_open(id) {
            return Err(UiError::AlreadyRegistered("bulk session").warn());
        }
        self.open.push((id, Vec::new()));
        log::debug!("bulk session {id:?} opened");
        Ok(())
    }

    /// Whether a session is open
    pub fn is_open(&self, id: SessionId) -> bool {
        self.open.iter().any(|(s, _)| *s == id)
    }

    /// Park work in an open session; returns `false` when the session is not open
    pub fn push(&mut self, id: SessionId, item: Deferred) -> bool {
        match self.open.iter_mut().find(|(s, _)| *s == id) {
            Some((_, queue)) => {
                queue.push(item);
                true
            }
            None => false,
        }
    }

    /// Close a session and return its queue
    pub fn end(&mut self, id: SessionId) -> UiResult<Vec<Deferred>> {
        let position = self
            .open
            .iter()
            .position(|(s, _)| *s == id)
            .ok_or_else(|| UiError::SessionNotOpen(id).warn())?;
        let (_, queue) = self.open.remove(position);
        log::debug!("bulk session {id:?} closed with {} deferred items", queue.len());
        Ok(queue)
    }
}
