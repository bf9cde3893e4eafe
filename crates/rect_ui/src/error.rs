//! Error types for UI operations
//!
//! Nothing in the UI core uses errors as control flow. Every `Err` is logged
//! where it is detected and the failing operation leaves state untouched, so
//! callers can discard the result without losing diagnostics.

use crate::foundation::collections::{
    BehaviourKey, GroupKey, NodeKey, RaycasterKey, SessionId, SurfaceKey,
};

/// Usage errors raised by world operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UiError {
    /// Node handle no longer resolves
    #[error("node {0:?} does not exist (destroyed or never created)")]
    StaleNode(NodeKey),

    /// Surface handle no longer resolves
    #[error("render surface {0:?} does not exist")]
    StaleSurface(SurfaceKey),

    /// Canvas group handle no longer resolves
    #[error("canvas group {0:?} does not exist")]
    StaleGroup(GroupKey),

    /// Raycaster handle no longer resolves
    #[error("raycaster {0:?} does not exist")]
    StaleRaycaster(RaycasterKey),

    /// Behaviour handle no longer resolves
    #[error("behaviour {0:?} does not exist")]
    StaleBehaviour(BehaviourKey),

    /// Anchor edges are parent-relative and need a parent
    #[error("node {0:?} has no parent; anchor edges are relative to a parent rect")]
    NoParent(NodeKey),

    /// Reparenting would create a cycle
    #[error("cannot attach node {child:?} under {parent:?}, which is the node itself or one of its descendants")]
    CyclicParent {
        /// Node being moved
        child: NodeKey,
        /// Requested parent
        parent: NodeKey,
    },

    /// Something was registered twice
    #[error("{0}: already exist")]
    AlreadyRegistered(&'static str),

    /// Removal target was not registered
    #[error("{0}: not exist")]
    NotRegistered(&'static str),

    /// Session id is not open
    #[error("bulk session {0:?} is not open")]
    SessionNotOpen(SessionId),
}

impl UiError {
    /// Log this error as a usage warning and hand it back
    pub(crate) fn warn(self) -> Self {
        log::warn!("{self}");
        self
    }

    /// Log this error as a consistency failure and hand it back
    pub(crate) fn consistency(self) -> Self {
        crate::foundation::logging::consistency_failure(&self.to_string());
        self
    }
}

/// Result alias for UI operations
pub type UiResult<T> = Result<T, UiError>;
