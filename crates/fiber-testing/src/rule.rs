use std::sync::Arc;

use fiber_core::{
    CommitSummary, Deadline, Element, FiberError, NodeId, Runtime, Scheduler, SchedulerConfig,
    WorkStatus,
};

use crate::memory_host::MemoryHost;
use crate::scheduler::{StepDeadline, TestScheduler};

const MAX_PUMPS: usize = 1_000;

/// Headless harness for exercising a scheduler against [`MemoryHost`].
///
/// The rule owns a container node and a counting scheduler. Helpers drive
/// the unit-of-work loop and the deferred effect queue explicitly, so tests
/// decide exactly when rendering, committing and effects happen.
pub struct RenderTestRule {
    scheduler: Scheduler<MemoryHost>,
    requests: Arc<TestScheduler>,
    container: NodeId,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let requests = Arc::new(TestScheduler::default());
        let runtime = Runtime::new(requests.clone());
        let mut host = MemoryHost::new();
        let container = host.create_container();
        Self {
            scheduler: Scheduler::with_runtime(host, runtime).with_config(config),
            requests,
            container,
        }
    }

    /// Renders `element` and pumps until rendering and effects settle.
    pub fn set_content(&mut self, element: Element) -> Result<(), FiberError> {
        self.render(element);
        self.run_until_idle().map(|_| ())
    }

    /// Starts a generation without doing any work.
    pub fn render(&mut self, element: Element) {
        self.scheduler.render(element, self.container);
    }

    pub fn unmount(&mut self) {
        self.scheduler.unmount();
    }

    /// Runs one scheduler turn that may process at most `units` fibers.
    pub fn step(&mut self, units: usize) -> Result<WorkStatus, FiberError> {
        self.work(&StepDeadline::units(units))
    }

    pub fn work(&mut self, deadline: &dyn Deadline) -> Result<WorkStatus, FiberError> {
        self.scheduler.work_loop(deadline)
    }

    /// Renders and commits whatever is pending, leaving effects queued.
    pub fn flush(&mut self) -> Result<WorkStatus, FiberError> {
        self.scheduler.flush_sync()
    }

    pub fn flush_effects(&self) -> usize {
        self.scheduler.flush_deferred()
    }

    /// Alternates rendering and effect flushing until neither has work.
    /// Returns the number of commits made.
    pub fn run_until_idle(&mut self) -> Result<usize, FiberError> {
        let mut commits = 0;
        for pump in 0..MAX_PUMPS {
            let mut progressed = false;
            if self.scheduler.has_pending_work() {
                if self.flush()? == WorkStatus::Committed {
                    commits += 1;
                }
                progressed = true;
            }
            if self.scheduler.runtime().has_deferred() {
                self.flush_effects();
                progressed = true;
            }
            if !progressed {
                tracing::debug!(pumps = pump, commits, "render loop settled");
                return Ok(commits);
            }
        }
        panic!("render loop did not settle after {MAX_PUMPS} pumps");
    }

    /// Dispatches `event` on the first mounted `tag` element. Returns how many
    /// listeners ran.
    pub fn dispatch(&self, tag: &str, event: &str) -> usize {
        match self.host().find(tag) {
            Some(node) => self.host().dispatch_event(node, event),
            None => 0,
        }
    }

    pub fn click(&self, tag: &str) -> usize {
        self.dispatch(tag, "click")
    }

    pub fn host(&self) -> &MemoryHost {
        self.scheduler.adapter()
    }

    pub fn host_mut(&mut self) -> &mut MemoryHost {
        self.scheduler.adapter_mut()
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// Host nodes directly under the container.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.host().children(self.container)
    }

    pub fn text(&self) -> String {
        self.host().text_content(self.container)
    }

    pub fn dump(&self) -> String {
        self.host().dump_tree(Some(self.container))
    }

    pub fn scheduler(&self) -> &Scheduler<MemoryHost> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<MemoryHost> {
        &mut self.scheduler
    }

    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.scheduler.last_commit()
    }

    pub fn requests(&self) -> &TestScheduler {
        &self.requests
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a rule.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::EffectTag;

    #[test]
    fn rule_mounts_into_its_container() {
        run_test_render(|rule| {
            assert!(rule.root_nodes().is_empty());
            rule.set_content(Element::host("p").child("hello")).unwrap();
            assert_eq!(rule.root_nodes().len(), 1);
            assert_eq!(rule.text(), "hello");
            assert_eq!(rule.last_commit().unwrap().count(EffectTag::Placement), 2);
            assert!(rule.requests().idle_requests() >= 1);
        });
    }
}
