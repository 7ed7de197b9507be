//! Testing utilities and harness for fiber-core.

pub mod logging;
pub mod memory_host;
pub mod rule;
pub mod scheduler;

pub use logging::init_test_logging;
pub use memory_host::{HostOp, MemoryHost, MemoryNode, NodeKind};
pub use rule::{run_test_render, RenderTestRule};
pub use scheduler::{StepDeadline, TestScheduler};

pub mod prelude {
    pub use crate::{init_test_logging, MemoryHost, RenderTestRule, StepDeadline};
    pub use fiber_core::*;
}
