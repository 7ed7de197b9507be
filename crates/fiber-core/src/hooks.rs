//! Per-fiber local state, addressed by call order.
//!
//! While a component body runs, the scheduler installs a hook frame holding
//! that fiber's cells. Each hook call takes the next cell from the frame. The
//! order of hook calls must be the same on every render of a component; if a
//! cell no longer has the expected type it is rebuilt, together with every
//! cell after it.

use std::any::{type_name, Any};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::error::FiberError;
use crate::hash::hash_key;
use crate::mutable_ref::MutableRef;
use crate::runtime::RuntimeHandle;
use crate::Key;

pub type HookCell = Rc<dyn Any>;

struct HookFrame {
    cells: Vec<HookCell>,
    cursor: usize,
    runtime: RuntimeHandle,
    component: &'static str,
}

thread_local! {
    static HOOK_FRAMES: RefCell<Vec<HookFrame>> = const { RefCell::new(Vec::new()) };
}

/// Runs `render` with `cells` installed as the active hook frame and returns
/// its output together with the (possibly grown) cells.
pub fn render_with_hooks<R>(
    cells: Vec<HookCell>,
    runtime: RuntimeHandle,
    component: &'static str,
    render: impl FnOnce() -> R,
) -> (R, Vec<HookCell>) {
    HOOK_FRAMES.with(|frames| {
        frames.borrow_mut().push(HookFrame {
            cells,
            cursor: 0,
            runtime,
            component,
        })
    });

    struct Guard {
        armed: bool,
    }
    impl Guard {
        fn finish(mut self) -> Vec<HookCell> {
            self.armed = false;
            HOOK_FRAMES
                .with(|frames| frames.borrow_mut().pop())
                .map(|frame| frame.cells)
                .unwrap_or_default()
        }
    }
    impl Drop for Guard {
        fn drop(&mut self) {
            if self.armed {
                HOOK_FRAMES.with(|frames| {
                    frames.borrow_mut().pop();
                });
            }
        }
    }

    let guard = Guard { armed: true };
    let output = render();
    (output, guard.finish())
}

/// Whether a component body is currently running on this thread.
pub fn is_rendering() -> bool {
    HOOK_FRAMES.with(|frames| !frames.borrow().is_empty())
}

fn with_frame<R>(hook: &'static str, f: impl FnOnce(&mut HookFrame) -> R) -> R {
    HOOK_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(frame) => f(frame),
            None => panic!("{}", FiberError::InvalidHookUsage { hook }),
        }
    })
}

fn next_cell<C: 'static>(hook: &'static str, init: impl FnOnce(&RuntimeHandle) -> C) -> Rc<C> {
    let (index, existing, runtime, component) = with_frame(hook, |frame| {
        let index = frame.cursor;
        frame.cursor += 1;
        (
            index,
            frame.cells.get(index).cloned(),
            frame.runtime.clone(),
            frame.component,
        )
    });

    if let Some(existing) = existing {
        match existing.downcast::<C>() {
            Ok(cell) => return cell,
            Err(_) => tracing::warn!(
                component,
                index,
                hook,
                expected = type_name::<C>(),
                "hook order changed, resetting cells"
            ),
        }
    }

    // The frame is not borrowed while user init code runs.
    let cell = Rc::new(init(&runtime));
    with_frame(hook, |frame| {
        frame.cells.truncate(index);
        frame.cells.push(cell.clone());
    });
    cell
}

/// Dependency fingerprint recorded by memo and effect hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deps {
    /// No dependency list: treated as changed on every render.
    Always,
    Keyed(Key),
}

impl Deps {
    pub fn of<D: Hash + ?Sized>(deps: &D) -> Self {
        Deps::Keyed(hash_key(deps))
    }

    pub fn changed_since(self, previous: Option<Deps>) -> bool {
        match (self, previous) {
            (Deps::Keyed(now), Some(Deps::Keyed(before))) => now != before,
            _ => true,
        }
    }
}

/// Stable handle that feeds actions into a reducer cell.
pub struct Dispatch<A> {
    inner: Rc<dyn Fn(A)>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch")
    }
}

impl<A> Dispatch<A> {
    pub fn new(f: impl Fn(A) + 'static) -> Self {
        Self { inner: Rc::new(f) }
    }

    /// Applies `action` now. A new generation is requested only when the
    /// resulting state differs from the previous one.
    pub fn dispatch(&self, action: A) {
        (self.inner)(action)
    }
}

pub enum StateAction<T> {
    Set(T),
    Update(Box<dyn FnOnce(&T) -> T>),
}

pub type SetState<T> = Dispatch<StateAction<T>>;

impl<T: 'static> Dispatch<StateAction<T>> {
    pub fn set(&self, value: T) {
        self.dispatch(StateAction::Set(value));
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        self.dispatch(StateAction::Update(Box::new(f)));
    }
}

struct ReducerCell<S, A> {
    state: Rc<RefCell<S>>,
    dispatch: Dispatch<A>,
}

fn reducer_hook<S, A>(
    hook: &'static str,
    reducer: impl Fn(&S, A) -> S + 'static,
    init: impl FnOnce() -> S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    let cell = next_cell(hook, move |runtime| {
        let state = Rc::new(RefCell::new(init()));
        let weak: Weak<RefCell<S>> = Rc::downgrade(&state);
        let runtime = runtime.clone();
        let dispatch = Dispatch::new(move |action: A| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let next = reducer(&state.borrow(), action);
            if *state.borrow() == next {
                return;
            }
            *state.borrow_mut() = next;
            runtime.request_render();
        });
        ReducerCell { state, dispatch }
    });
    let state = cell.state.borrow().clone();
    (state, cell.dispatch.clone())
}

/// State driven by `reducer`. The reducer is fixed by the first render.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    init: impl FnOnce() -> S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    reducer_hook("use_reducer", reducer, init)
}

pub fn use_state<T>(init: impl FnOnce() -> T) -> (T, SetState<T>)
where
    T: Clone + PartialEq + 'static,
{
    reducer_hook(
        "use_state",
        |state: &T, action: StateAction<T>| match action {
            StateAction::Set(value) => value,
            StateAction::Update(f) => f(state),
        },
        init,
    )
}

struct MemoCell<T> {
    entry: RefCell<Option<(Deps, T)>>,
}

fn memo_hook<T: Clone + 'static>(hook: &'static str, factory: impl FnOnce() -> T, deps: Deps) -> T {
    let cell = next_cell(hook, |_| MemoCell::<T> {
        entry: RefCell::new(None),
    });
    let cached = cell
        .entry
        .borrow()
        .as_ref()
        .filter(|(previous, _)| !deps.changed_since(Some(*previous)))
        .map(|(_, value)| value.clone());
    if let Some(value) = cached {
        return value;
    }
    let value = factory();
    *cell.entry.borrow_mut() = Some((deps, value.clone()));
    value
}

/// Recomputes `factory` only when `deps` changed since the previous render.
pub fn use_memo<T, D>(factory: impl FnOnce() -> T, deps: D) -> T
where
    T: Clone + 'static,
    D: Hash,
{
    memo_hook("use_memo", factory, Deps::of(&deps))
}

/// Keeps the same `Rc` to `f` until `deps` change.
pub fn use_callback<F, D>(f: F, deps: D) -> Rc<F>
where
    F: 'static,
    D: Hash,
{
    memo_hook("use_callback", move || Rc::new(f), Deps::of(&deps))
}

/// Holder whose contents survive every re-render of the component.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> MutableRef<T> {
    let cell = next_cell("use_ref", move |_| MutableRef::new(init()));
    (*cell).clone()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EffectScope;

impl EffectScope {
    /// Registers `cleanup` to run before the effect runs again or when the
    /// component is removed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> EffectResult {
        EffectResult {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn done(&self) -> EffectResult {
        EffectResult::default()
    }
}

#[derive(Default)]
pub struct EffectResult {
    cleanup: Option<Box<dyn FnOnce()>>,
}

type EffectBody = Box<dyn FnOnce(EffectScope) -> EffectResult>;

/// A render writes `pending`. Commit moves it to `queued` and records its
/// deps as the committed ones, so renders that never commit neither move the
/// comparison point nor touch a body already waiting for the flush.
#[derive(Default)]
pub(crate) struct EffectCell {
    deps: Cell<Option<Deps>>,
    pending: RefCell<Option<(Deps, EffectBody)>>,
    queued: RefCell<Option<EffectBody>>,
    cleanup: RefCell<Option<Box<dyn FnOnce()>>>,
    disposed: Cell<bool>,
}

impl EffectCell {
    fn has_queued(&self) -> bool {
        self.queued.borrow().is_some()
    }

    /// Promotes the body of the render being committed.
    fn queue(&self) -> bool {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some((deps, body)) => {
                self.deps.set(Some(deps));
                *self.queued.borrow_mut() = Some(body);
                true
            }
            None => false,
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    fn run_queued(&self) {
        let body = self.queued.borrow_mut().take();
        if let Some(body) = body {
            let result = body(EffectScope);
            *self.cleanup.borrow_mut() = result.cleanup;
        }
    }

    fn dispose(&self) {
        self.disposed.set(true);
        self.pending.borrow_mut().take();
        self.queued.borrow_mut().take();
        self.run_cleanup();
    }
}

impl Drop for EffectCell {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

fn effect_hook(hook: &'static str, effect: EffectBody, deps: Deps) {
    let cell = next_cell(hook, |_| EffectCell::default());
    // Replaces or drops whatever an abandoned render left behind.
    let pending = deps
        .changed_since(cell.deps.get())
        .then(|| (deps, effect));
    *cell.pending.borrow_mut() = pending;
}

/// Schedules `effect` to run after commit whenever `deps` changed since the
/// last committed render.
pub fn use_effect<D: Hash>(effect: impl FnOnce(EffectScope) -> EffectResult + 'static, deps: D) {
    effect_hook("use_effect", Box::new(effect), Deps::of(&deps));
}

/// Schedules `effect` to run after every commit.
pub fn use_effect_always(effect: impl FnOnce(EffectScope) -> EffectResult + 'static) {
    effect_hook("use_effect_always", Box::new(effect), Deps::Always);
}

/// Called when the fiber owning `cells` commits. Returns the effect cells
/// whose rendered body is now waiting for the flush.
pub(crate) fn queue_effects(cells: &[HookCell]) -> Vec<Rc<EffectCell>> {
    cells
        .iter()
        .filter_map(|cell| cell.clone().downcast::<EffectCell>().ok())
        .filter(|cell| !cell.disposed.get() && cell.queue())
        .collect()
}

/// Runs every stale cleanup, then every queued body.
pub(crate) fn flush_effects(cells: &[Rc<EffectCell>]) {
    let live: Vec<&Rc<EffectCell>> = cells
        .iter()
        .filter(|cell| !cell.disposed.get() && cell.has_queued())
        .collect();
    for cell in &live {
        cell.run_cleanup();
    }
    for cell in &live {
        cell.run_queued();
    }
}

/// Releases a removed fiber's cells: effect cleanups run once and pending
/// bodies are dropped.
pub(crate) fn dispose_cells(cells: &[HookCell]) {
    for cell in cells {
        if let Some(effect) = cell.downcast_ref::<EffectCell>() {
            if !effect.disposed.get() {
                effect.dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DefaultScheduler, Runtime};
    use std::sync::Arc;

    fn render<R>(runtime: &Runtime, cells: Vec<HookCell>, f: impl FnOnce() -> R) -> (R, Vec<HookCell>) {
        render_with_hooks(cells, runtime.handle(), "test", f)
    }

    #[test]
    fn state_persists_and_equal_dispatch_is_ignored() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let ((count, set), cells) = render(&runtime, Vec::new(), || use_state(|| 1));
        assert_eq!(count, 1);

        set.set(1);
        assert!(!runtime.take_render_request());
        set.update(|c| c + 1);
        assert!(runtime.take_render_request());

        let ((count, again), _) = render(&runtime, cells, || use_state(|| 100));
        assert_eq!(count, 2);
        assert_eq!(set, again);
    }

    #[test]
    fn reducer_applies_actions() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let reducer = |total: &i32, delta: i32| total + delta;
        let ((_, dispatch), cells) = render(&runtime, Vec::new(), || use_reducer(reducer, || 0));
        dispatch.dispatch(5);
        dispatch.dispatch(-2);
        let ((total, _), _) = render(&runtime, cells, || use_reducer(reducer, || 0));
        assert_eq!(total, 3);
    }

    #[test]
    fn memo_recomputes_only_on_changed_deps() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let calls = Rc::new(Cell::new(0));
        let memo = |dep: u8| {
            let calls = calls.clone();
            move || {
                use_memo(
                    || {
                        calls.set(calls.get() + 1);
                        dep * 2
                    },
                    dep,
                )
            }
        };
        let (v, cells) = render(&runtime, Vec::new(), memo(1));
        let (w, cells) = render(&runtime, cells, memo(1));
        assert_eq!((v, w, calls.get()), (2, 2, 1));
        let (x, _) = render(&runtime, cells, memo(3));
        assert_eq!((x, calls.get()), (6, 2));
    }

    #[test]
    fn ref_holder_is_stable() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let (first, cells) = render(&runtime, Vec::new(), || use_ref(|| 0));
        first.set(9);
        let (second, _) = render(&runtime, cells, || use_ref(|| 0));
        assert!(first.ptr_eq(&second));
        assert_eq!(second.current(), 9);
    }

    #[test]
    fn changed_hook_order_resets_cells() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let (_, cells) = render(&runtime, Vec::new(), || {
            use_ref(|| "text");
            use_state(|| 1)
        });
        let ((count, _), cells) = render(&runtime, cells, || use_state(|| 7));
        assert_eq!(count, 7);
        assert_eq!(cells.len(), 1);
    }

    #[test]
    fn effect_cleanup_precedes_next_body() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let log = Rc::new(RefCell::new(Vec::new()));
        let effect = |dep: u8| {
            let log = log.clone();
            move || {
                use_effect(
                    move |scope| {
                        log.borrow_mut().push(format!("run {dep}"));
                        scope.on_cleanup(move || log.borrow_mut().push(format!("clean {dep}")))
                    },
                    dep,
                )
            }
        };

        let (_, cells) = render(&runtime, Vec::new(), effect(1));
        flush_effects(&queue_effects(&cells));
        let (_, cells) = render(&runtime, cells, effect(1));
        assert!(queue_effects(&cells).is_empty());
        let (_, cells) = render(&runtime, cells, effect(2));
        flush_effects(&queue_effects(&cells));
        dispose_cells(&cells);
        dispose_cells(&cells);
        assert_eq!(
            *log.borrow(),
            vec!["run 1", "clean 1", "run 2", "clean 2"]
        );
    }

    #[test]
    fn uncommitted_render_does_not_move_effect_deps() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let log = Rc::new(RefCell::new(Vec::new()));
        let effect = |dep: u8| {
            let log = log.clone();
            move || {
                use_effect(
                    move |scope| {
                        log.borrow_mut().push(format!("run {dep}"));
                        scope.done()
                    },
                    dep,
                )
            }
        };

        let (_, cells) = render(&runtime, Vec::new(), effect(1));
        flush_effects(&queue_effects(&cells));
        // Rendered with 2 but never committed, then back to 1.
        let (_, cells) = render(&runtime, cells, effect(2));
        let (_, cells) = render(&runtime, cells, effect(1));
        assert!(queue_effects(&cells).is_empty());

        // A committed body survives a later render that has not committed.
        let (_, cells) = render(&runtime, cells, effect(3));
        let queued = queue_effects(&cells);
        let (_, cells) = render(&runtime, cells, effect(4));
        flush_effects(&queued);
        assert_eq!(*log.borrow(), vec!["run 1", "run 3"]);
        assert_eq!(queue_effects(&cells).len(), 1);
    }

    #[test]
    fn frame_is_popped_after_render() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        assert!(!is_rendering());
        let (inside, _) = render(&runtime, Vec::new(), is_rendering);
        assert!(inside);
        assert!(!is_rendering());
    }

    #[test]
    #[should_panic(expected = "`use_state` called outside of a component render")]
    fn hooks_outside_render_panic() {
        use_state(|| 0);
    }
}
