use thiserror::Error;

use crate::NodeId;

/// Failure raised by a component body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for RenderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RenderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Failure reported by a [`HostAdapter`](crate::host::HostAdapter) primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host node {id} does not exist")]
    MissingNode { id: NodeId },
    #[error("host node {id} cannot hold children")]
    NotAContainer { id: NodeId },
    #[error("host node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

/// Errors surfaced by the scheduler. Render errors drop the generation and
/// leave the committed tree as it was. Adapter errors during commit keep the
/// mutations already applied, with the fiber tree matching the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiberError {
    #[error("component `{component}` failed to render: {source}")]
    Render {
        component: &'static str,
        #[source]
        source: RenderError,
    },
    #[error("`{hook}` called outside of a component render")]
    InvalidHookUsage { hook: &'static str },
    #[error("host adapter failed: {0}")]
    Adapter(#[from] HostError),
    #[error("fiber `{fiber}` has no host ancestor to attach to")]
    MissingHostParent { fiber: String },
}
