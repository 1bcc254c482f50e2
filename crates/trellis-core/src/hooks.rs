//! Per-component hook state.
//!
//! Each function component owns an ordered list of hook records. A render
//! walks the previous list with a cursor and builds the next one; calls must
//! happen in the same order on every render.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{Context, ContextStack};
use crate::value::Value;
use crate::work_node::{EffectFlags, NodeId};

/// Collects state updates raised by dispatchers.
pub(crate) trait UpdateSink {
    fn schedule_update(&self, node: NodeId);
}

/// Sink used by roots that are driven without a scheduler.
#[cfg(test)]
pub(crate) struct DetachedSink;

#[cfg(test)]
impl UpdateSink for DetachedSink {
    fn schedule_update(&self, _node: NodeId) {}
}

#[cfg(test)]
pub(crate) fn detached_sink() -> Weak<dyn UpdateSink> {
    Weak::<DetachedSink>::new()
}

/// Builds a dependency list for [`Hooks::use_effect`] and friends.
#[macro_export]
macro_rules! deps {
    () => {
        ::std::option::Option::Some(::std::vec::Vec::<$crate::Value>::new())
    };
    ($($dep:expr),+ $(,)?) => {
        ::std::option::Option::Some(::std::vec![$($crate::Value::from($dep)),+])
    };
}

pub type Cleanup = Box<dyn FnOnce()>;
type Create = Box<dyn FnOnce() -> Option<Cleanup>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectTag {
    /// Runs synchronously after host mutations.
    Layout,
    /// Runs in a later low-priority task.
    Passive,
}

/// Cleanup slot shared by every generation of one effect hook.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

impl EffectInstance {
    pub(crate) fn run_destroy(&self) {
        let destroy = self.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
}

/// An effect queued by a render, run at commit.
pub(crate) struct Effect {
    pub(crate) tag: EffectTag,
    create: RefCell<Option<Create>>,
    pub(crate) instance: Rc<EffectInstance>,
}

impl Effect {
    pub(crate) fn run_destroy(&self) {
        self.instance.run_destroy();
    }

    pub(crate) fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let cleanup = create();
            *self.instance.destroy.borrow_mut() = cleanup;
        }
    }
}

#[derive(Clone)]
pub(crate) enum Hook {
    Reducer(Rc<dyn Any>),
    Memo {
        value: Rc<dyn Any>,
        deps: Option<Vec<Value>>,
    },
    Ref(Rc<dyn Any>),
    Effect {
        tag: EffectTag,
        instance: Rc<EffectInstance>,
        deps: Option<Vec<Value>>,
    },
}

impl Hook {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Hook::Reducer(_) => "reducer",
            Hook::Memo { .. } => "memo",
            Hook::Ref(_) => "ref",
            Hook::Effect { .. } => "effect",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Effect { tag, deps, .. } => f
                .debug_struct("Effect")
                .field("tag", tag)
                .field("deps", deps)
                .finish(),
            Hook::Memo { deps, .. } => f.debug_struct("Memo").field("deps", deps).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

fn hook_order_violation(index: usize, expected: &str) -> ! {
    panic!("hook {index} is not a {expected} hook; hooks must run in the same order on every render")
}

/// Two dependency lists are equal when every position compares identical.
/// A length mismatch counts as a change.
pub(crate) fn deps_equal(next: &[Value], previous: &[Value]) -> bool {
    if next.len() != previous.len() {
        log::warn!(
            "dependency list changed length between renders ({} -> {})",
            previous.len(),
            next.len()
        );
        return false;
    }
    next.iter().zip(previous).all(|(a, b)| a.is(b))
}

#[derive(Clone)]
struct UpdateTarget {
    node: NodeId,
    sink: Weak<dyn UpdateSink>,
}

/// Reducer state shared by every generation of one `use_reducer` hook.
struct ReducerCell<S, A> {
    state: RefCell<S>,
    reducer: RefCell<Rc<dyn Fn(&S, A) -> S>>,
    dispatch: Dispatch<A>,
}

/// Sends actions to a reducer hook. Stable across renders.
pub struct Dispatch<A> {
    apply: Rc<dyn Fn(A)>,
}

impl<A: 'static> Dispatch<A> {
    fn new<S: 'static>(cell: Weak<ReducerCell<S, A>>, target: UpdateTarget) -> Self {
        let apply = move |action: A| {
            let Some(cell) = cell.upgrade() else {
                log::debug!("dropping action for unmounted node {}", target.node);
                return;
            };
            let next = {
                let reducer = cell.reducer.borrow().clone();
                let state = cell.state.borrow();
                reducer(&*state, action)
            };
            *cell.state.borrow_mut() = next;
            if let Some(sink) = target.sink.upgrade() {
                sink.schedule_update(target.node);
            }
        };
        Self {
            apply: Rc::new(apply),
        }
    }

    pub fn dispatch(&self, action: A) {
        (self.apply)(action)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.apply, &other.apply)
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            apply: self.apply.clone(),
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch(..)")
    }
}

pub enum StateAction<S> {
    Set(S),
    Update(Box<dyn FnOnce(&S) -> S>),
}

/// Setter returned by [`Hooks::use_state`].
pub struct SetState<S> {
    dispatch: Dispatch<StateAction<S>>,
}

impl<S: 'static> SetState<S> {
    pub fn set(&self, value: S) {
        self.dispatch.dispatch(StateAction::Set(value));
    }

    pub fn update(&self, update: impl FnOnce(&S) -> S + 'static) {
        self.dispatch.dispatch(StateAction::Update(Box::new(update)));
    }
}

impl<S> Clone for SetState<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
        }
    }
}

/// Mutable box that persists across renders without scheduling updates.
pub struct MutableRef<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> MutableRef<T> {
    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }
}

impl<T: Clone> MutableRef<T> {
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T> Clone for MutableRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

/// Result of one component render's hook calls.
pub(crate) struct RenderedHooks {
    pub(crate) hooks: Vec<Hook>,
    pub(crate) effects: Vec<Rc<Effect>>,
    pub(crate) flags: EffectFlags,
}

/// Hook cursor handed to function components.
pub struct Hooks<'a> {
    previous: Option<&'a [Hook]>,
    hooks: Vec<Hook>,
    effects: Vec<Rc<Effect>>,
    flags: EffectFlags,
    node: NodeId,
    sink: &'a Weak<dyn UpdateSink>,
    context: &'a ContextStack,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(
        previous: Option<&'a [Hook]>,
        node: NodeId,
        sink: &'a Weak<dyn UpdateSink>,
        context: &'a ContextStack,
    ) -> Self {
        Self {
            previous,
            hooks: Vec::with_capacity(previous.map_or(0, <[Hook]>::len)),
            effects: Vec::new(),
            flags: EffectFlags::empty(),
            node,
            sink,
            context,
        }
    }

    fn is_mount(&self) -> bool {
        self.previous.is_none()
    }

    fn previous_hook(&self) -> Option<&'a Hook> {
        self.previous.and_then(|hooks| hooks.get(self.hooks.len()))
    }

    fn target(&self) -> UpdateTarget {
        UpdateTarget {
            node: self.node,
            sink: self.sink.clone(),
        }
    }

    pub fn use_reducer<S, A>(
        &mut self,
        reducer: impl Fn(&S, A) -> S + 'static,
        init: impl FnOnce() -> S,
    ) -> (S, Dispatch<A>)
    where
        S: Clone + 'static,
        A: 'static,
    {
        let index = self.hooks.len();
        let reducer: Rc<dyn Fn(&S, A) -> S> = Rc::new(reducer);
        let cell = match self.previous_hook() {
            Some(Hook::Reducer(existing)) => {
                let cell = existing
                    .clone()
                    .downcast::<ReducerCell<S, A>>()
                    .unwrap_or_else(|_| hook_order_violation(index, "reducer"));
                *cell.reducer.borrow_mut() = reducer;
                cell
            }
            Some(_) => hook_order_violation(index, "reducer"),
            None => {
                let target = self.target();
                let state = init();
                Rc::new_cyclic(|weak: &Weak<ReducerCell<S, A>>| ReducerCell {
                    state: RefCell::new(state),
                    reducer: RefCell::new(reducer),
                    dispatch: Dispatch::new(weak.clone(), target),
                })
            }
        };
        let state = cell.state.borrow().clone();
        let dispatch = cell.dispatch.clone();
        self.hooks.push(Hook::Reducer(cell));
        (state, dispatch)
    }

    pub fn use_state<S: Clone + 'static>(&mut self, init: impl FnOnce() -> S) -> (S, SetState<S>) {
        let (state, dispatch) = self.use_reducer(
            |state: &S, action: StateAction<S>| match action {
                StateAction::Set(value) => value,
                StateAction::Update(update) => update(state),
            },
            init,
        );
        (state, SetState { dispatch })
    }

    /// Recomputes when `deps` change; `None` recomputes on every render.
    pub fn use_memo<T: 'static>(
        &mut self,
        compute: impl FnOnce() -> T,
        deps: Option<Vec<Value>>,
    ) -> Rc<T> {
        let index = self.hooks.len();
        if let Some(previous) = self.previous_hook() {
            let Hook::Memo {
                value,
                deps: previous_deps,
            } = previous
            else {
                hook_order_violation(index, "memo");
            };
            let unchanged = match (&deps, previous_deps) {
                (Some(next), Some(prev)) => deps_equal(next, prev),
                _ => false,
            };
            if unchanged {
                let value = value.clone();
                self.hooks.push(Hook::Memo {
                    value: value.clone(),
                    deps,
                });
                return value
                    .downcast::<T>()
                    .unwrap_or_else(|_| hook_order_violation(index, "memo"));
            }
        }
        let value = Rc::new(compute());
        let erased: Rc<dyn Any> = value.clone();
        self.hooks.push(Hook::Memo {
            value: erased,
            deps,
        });
        value
    }

    pub fn use_callback<F: 'static>(&mut self, callback: F, deps: Option<Vec<Value>>) -> Rc<F> {
        self.use_memo(move || callback, deps)
    }

    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> MutableRef<T> {
        let index = self.hooks.len();
        let cell = match self.previous_hook() {
            Some(Hook::Ref(existing)) => existing
                .clone()
                .downcast::<RefCell<T>>()
                .unwrap_or_else(|_| hook_order_violation(index, "ref")),
            Some(_) => hook_order_violation(index, "ref"),
            None => Rc::new(RefCell::new(init())),
        };
        self.hooks.push(Hook::Ref(cell.clone()));
        MutableRef { cell }
    }

    /// Runs `create` after the commit's host mutations, in a later task.
    pub fn use_effect<F>(&mut self, create: impl FnOnce() -> F + 'static, deps: Option<Vec<Value>>)
    where
        F: IntoCleanup,
    {
        self.push_effect(EffectTag::Passive, create, deps);
    }

    /// Runs `create` synchronously during commit, after host mutations.
    pub fn use_layout_effect<F>(
        &mut self,
        create: impl FnOnce() -> F + 'static,
        deps: Option<Vec<Value>>,
    ) where
        F: IntoCleanup,
    {
        self.push_effect(EffectTag::Layout, create, deps);
    }

    fn push_effect<F: IntoCleanup>(
        &mut self,
        tag: EffectTag,
        create: impl FnOnce() -> F + 'static,
        deps: Option<Vec<Value>>,
    ) {
        let index = self.hooks.len();
        let (instance, changed) = match self.previous_hook() {
            Some(Hook::Effect {
                tag: previous_tag,
                instance,
                deps: previous_deps,
            }) if *previous_tag == tag => {
                let changed = match (&deps, previous_deps) {
                    (Some(next), Some(prev)) => !deps_equal(next, prev),
                    _ => true,
                };
                (instance.clone(), changed)
            }
            Some(_) => hook_order_violation(index, "effect"),
            None => (Rc::new(EffectInstance::default()), true),
        };
        if changed {
            let create: Create = Box::new(move || create().into_cleanup());
            self.effects.push(Rc::new(Effect {
                tag,
                create: RefCell::new(Some(create)),
                instance: instance.clone(),
            }));
            self.flags |= match tag {
                EffectTag::Layout => EffectFlags::UPDATE,
                EffectTag::Passive => EffectFlags::PASSIVE,
            };
        }
        self.hooks.push(Hook::Effect {
            tag,
            instance,
            deps,
        });
    }

    /// Reads the nearest provider's value. Does not occupy a hook slot.
    pub fn use_context<T: 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        Context::<T>::unwrap(&self.context.read(context.erased()))
    }

    pub(crate) fn finish(self) -> RenderedHooks {
        if let Some(previous) = self.previous {
            if previous.len() != self.hooks.len() {
                log::warn!(
                    "node {} rendered {} hooks, previously {}",
                    self.node,
                    self.hooks.len(),
                    previous.len()
                );
            }
        }
        RenderedHooks {
            hooks: self.hooks,
            effects: self.effects,
            flags: self.flags,
        }
    }
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("node", &self.node)
            .field("mount", &self.is_mount())
            .field("cursor", &self.hooks.len())
            .finish()
    }
}

/// Return type accepted from effect bodies: `()`, a [`Cleanup`], or an optional one.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// Boxes a teardown closure for returning from an effect body.
pub fn cleanup(teardown: impl FnOnce() + 'static) -> Cleanup {
    Box::new(teardown)
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
