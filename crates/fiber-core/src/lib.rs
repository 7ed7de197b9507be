#![doc = r"Fiber-based reconciler: element model, positional diffing, hooks and a cooperative scheduler."]

pub mod commit;
pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hash;
pub mod hooks;
pub mod host;
pub mod mutable_ref;
pub mod platform;
pub mod reconciler;
pub mod runtime;
pub mod scheduler;

pub type Key = u64;
pub type NodeId = usize;

pub use commit::{CommitEntry, CommitSummary};
pub use config::SchedulerConfig;
pub use element::{
    h, Component, Element, ElementType, Event, IntoRender, Listener, NodeRef, PropValue, Props,
    NODE_VALUE,
};
pub use error::{FiberError, HostError, RenderError};
pub use fiber::{EffectTag, Fiber, FiberId, FiberKind};
pub use hooks::{
    is_rendering, use_callback, use_effect, use_effect_always, use_memo, use_reducer, use_ref,
    use_state, Deps, Dispatch, EffectResult, EffectScope, SetState, StateAction,
};
pub use host::{diff_props, HostAdapter, HostKind, PropPatch};
pub use mutable_ref::MutableRef;
pub use platform::{Clock, Deadline, RuntimeScheduler, Unbounded};
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use scheduler::{Scheduler, WorkStatus};
