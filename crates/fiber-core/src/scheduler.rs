//! Cooperative unit-of-work loop.
//!
//! A generation is rendered one fiber per step in pre-order. The loop yields
//! whenever the host's deadline runs low and resumes from the same fiber on
//! the next turn. Once every fiber has been visited the generation is
//! committed in a single step.

use std::rc::Rc;
use std::sync::Arc;

use crate::commit::CommitSummary;
use crate::config::SchedulerConfig;
use crate::element::{Component, Element, Props};
use crate::error::FiberError;
use crate::fiber::{EffectTag, Fiber, FiberArena, FiberId, FiberKind};
use crate::hooks::render_with_hooks;
use crate::host::HostAdapter;
use crate::platform::{Deadline, Unbounded};
use crate::reconciler::reconcile_children;
use crate::runtime::{DefaultScheduler, Runtime};
use crate::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing left to render.
    Idle,
    /// The deadline ran out with fibers still to visit.
    Yielded,
    /// A generation was committed during this turn.
    Committed,
}

pub struct Scheduler<A: HostAdapter> {
    pub(crate) adapter: A,
    pub(crate) runtime: Runtime,
    config: SchedulerConfig,
    pub(crate) fibers: FiberArena,
    pub(crate) current_root: Option<FiberId>,
    pub(crate) wip_root: Option<FiberId>,
    next_unit: Option<FiberId>,
    pub(crate) deletions: Vec<FiberId>,
    pub(crate) generation: u64,
    pub(crate) committed_generation: u64,
    pub(crate) last_commit: Option<CommitSummary>,
}

impl<A: HostAdapter> Scheduler<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_runtime(adapter, Runtime::new(Arc::new(DefaultScheduler)))
    }

    pub fn with_runtime(adapter: A, runtime: Runtime) -> Self {
        Self {
            adapter,
            runtime,
            config: SchedulerConfig::default(),
            fibers: FiberArena::new(),
            current_root: None,
            wip_root: None,
            next_unit: None,
            deletions: Vec::new(),
            generation: 0,
            committed_generation: 0,
            last_commit: None,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts a generation that renders `element` into `container`.
    ///
    /// Returns immediately; the work happens on later `work_loop` turns.
    pub fn render(&mut self, element: Element, container: NodeId) {
        let mut props = Props::new();
        props.children.push(element);
        self.begin_generation(container, Rc::new(props));
    }

    /// Starts a generation with an empty root so every mounted node is
    /// removed and every effect cleaned up.
    pub fn unmount(&mut self) {
        if let Some(container) = self.container() {
            self.begin_generation(container, Rc::new(Props::new()));
        }
    }

    fn begin_generation(&mut self, container: NodeId, props: Rc<Props>) {
        self.discard_work_in_progress();
        self.generation += 1;
        let root = self.fibers.insert(Fiber::root(
            container,
            props,
            self.current_root,
            self.generation,
        ));
        self.wip_root = Some(root);
        self.next_unit = Some(root);
        tracing::debug!(generation = self.generation, container, "generation started");
        self.runtime.request_idle_callback();
    }

    /// Abandons any in-flight generation and starts over against the
    /// committed tree. The in-flight root's element wins over the committed
    /// one so a pending `render` call is not lost.
    fn restart_from_current(&mut self) {
        let Some(template) = self.wip_root.or(self.current_root) else {
            return;
        };
        let (container, props) = {
            let fiber = &self.fibers[template];
            (fiber.state_node, fiber.props.clone())
        };
        let Some(container) = container else {
            return;
        };
        if self.wip_root.is_some() {
            tracing::debug!(generation = self.generation, "restarting in-flight generation");
        }
        self.begin_generation(container, props);
    }

    pub(crate) fn discard_work_in_progress(&mut self) {
        self.next_unit = None;
        if self.wip_root.take().is_none() {
            return;
        }
        let committed = self.committed_generation;
        self.fibers.retain(|_, fiber| fiber.generation <= committed);
        for (_, fiber) in self.fibers.iter_mut() {
            fiber.effect_tag = EffectTag::None;
        }
        self.deletions.clear();
    }

    /// Processes fibers until the deadline runs low or the generation is
    /// committed.
    ///
    /// A pending state change restarts the generation before the next fiber.
    /// Render errors abort the in-flight generation and leave the committed
    /// tree as it was.
    pub fn work_loop(&mut self, deadline: &dyn Deadline) -> Result<WorkStatus, FiberError> {
        loop {
            if self.runtime.take_render_request() {
                self.restart_from_current();
            }
            let Some(unit) = self.next_unit else {
                break;
            };
            if deadline.time_remaining() <= self.config.yield_threshold {
                self.runtime.request_idle_callback();
                return Ok(WorkStatus::Yielded);
            }
            match self.perform_unit_of_work(unit) {
                Ok(next) => self.next_unit = next,
                Err(err) => {
                    tracing::error!(%err, generation = self.generation, "render aborted");
                    self.discard_work_in_progress();
                    return Err(err);
                }
            }
        }

        if self.wip_root.is_some() {
            self.commit_root()?;
            return Ok(WorkStatus::Committed);
        }
        Ok(WorkStatus::Idle)
    }

    /// Runs the loop with no deadline.
    pub fn flush_sync(&mut self) -> Result<WorkStatus, FiberError> {
        self.work_loop(&Unbounded)
    }

    /// Renders one fiber and returns the next one to visit.
    fn perform_unit_of_work(&mut self, unit: FiberId) -> Result<Option<FiberId>, FiberError> {
        let kind = self.fibers[unit].kind.clone();
        tracing::trace!(fiber = %kind, "unit of work");
        match kind {
            FiberKind::Component(component) => self.update_component(unit, &component)?,
            FiberKind::Root | FiberKind::Host(_) | FiberKind::Text => self.update_host(unit)?,
        }
        Ok(self.fibers.next_in_preorder(unit))
    }

    fn update_component(&mut self, unit: FiberId, component: &Component) -> Result<(), FiberError> {
        let props = self.fibers[unit].props.clone();
        let cells = std::mem::take(&mut self.fibers[unit].hooks);
        let (rendered, cells) =
            render_with_hooks(cells, self.runtime.handle(), component.name(), || {
                component.render(&props)
            });
        self.fibers[unit].hooks = cells;

        let child = rendered.map_err(|source| FiberError::Render {
            component: component.name(),
            source,
        })?;
        let children: Vec<Element> = child.into_iter().collect();
        reconcile_children(
            &mut self.fibers,
            &mut self.deletions,
            self.generation,
            unit,
            &children,
        );
        Ok(())
    }

    fn update_host(&mut self, unit: FiberId) -> Result<(), FiberError> {
        let fiber = &self.fibers[unit];
        let props = fiber.props.clone();
        if fiber.state_node.is_none() {
            if let Some(kind) = fiber.kind.host_kind() {
                let node = self.adapter.create_node(&kind, &props)?;
                self.fibers[unit].state_node = Some(node);
            }
        }
        reconcile_children(
            &mut self.fibers,
            &mut self.deletions,
            self.generation,
            unit,
            &props.children,
        );
        Ok(())
    }

    /// Whether a generation is in flight or has been requested.
    pub fn has_pending_work(&self) -> bool {
        self.wip_root.is_some() || self.runtime.has_render_request()
    }

    pub fn is_rendering(&self) -> bool {
        self.next_unit.is_some()
    }

    /// Runs effects queued by earlier commits, oldest first.
    pub fn flush_deferred(&self) -> usize {
        self.runtime.flush_deferred()
    }

    pub fn fiber(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn fiber_count(&self) -> usize {
        self.fibers.len()
    }

    pub fn current_root(&self) -> Option<FiberId> {
        self.current_root
    }

    pub fn work_in_progress_root(&self) -> Option<FiberId> {
        self.wip_root
    }

    /// Container of the committed tree, or of the in-flight one before the
    /// first commit.
    pub fn container(&self) -> Option<NodeId> {
        self.current_root
            .or(self.wip_root)
            .and_then(|root| self.fibers.get(root))
            .and_then(|fiber| fiber.state_node)
    }

    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.last_commit.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn committed_generation(&self) -> u64 {
        self.committed_generation
    }

    pub fn dump_fibers(&self) -> String {
        self.fibers.dump(self.current_root)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}
