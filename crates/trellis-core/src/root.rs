//! Public entry point tying a render session to a scheduler.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::descriptor::Descriptor;
use crate::error::RenderError;
use crate::hooks::UpdateSink;
use crate::host::{Host, HostId};
use crate::inspect::NodeSnapshot;
use crate::scheduler::{Callback, Priority, Scheduler, TaskHandle};
use crate::work_loop::{FiberRoot, WorkStatus};
use crate::work_node::NodeId;

const NESTED_UPDATE_LIMIT: usize = 50;

/// Scheduling options for a [`Renderer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootOptions {
    /// Priority of render tasks triggered by updates.
    pub render_priority: Priority,
    /// Priority of the task that flushes passive effects after a commit.
    pub passive_priority: Priority,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            render_priority: Priority::Normal,
            passive_priority: Priority::Low,
        }
    }
}

/// Renders descriptor trees into a host container.
///
/// Updates (from [`Renderer::update_root`] or hook dispatchers) are queued
/// and rendered by a scheduler task, which may split the render into
/// slices. Commits apply host mutations in one pass.
pub struct Renderer<H: Host + 'static> {
    shared: Rc<RootShared<H>>,
}

struct RootShared<H: Host + 'static> {
    root: RefCell<FiberRoot<H>>,
    updates: RefCell<Vec<NodeId>>,
    pending_element: RefCell<Option<Rc<Descriptor>>>,
    scheduler: Scheduler,
    options: RootOptions,
    render_task: RefCell<Option<TaskHandle>>,
    passive_task: RefCell<Option<TaskHandle>>,
    last_error: RefCell<Option<RenderError>>,
    batch_depth: Cell<usize>,
    in_effects: Cell<bool>,
    effect_updates: Cell<bool>,
    nested_commits: Cell<usize>,
    halted: Cell<bool>,
    this: Weak<RootShared<H>>,
}

impl<H: Host + 'static> UpdateSink for RootShared<H> {
    fn schedule_update(&self, node: NodeId) {
        if !self.in_effects.get() {
            self.halted.set(false);
        } else if self.halted.get() {
            log::warn!("update for {node} dropped: effects keep scheduling updates");
            return;
        } else {
            self.effect_updates.set(true);
        }
        log::trace!("update queued for {node}");
        self.updates.borrow_mut().push(node);
        self.ensure_root_is_scheduled();
    }
}

impl<H: Host + 'static> RootShared<H> {
    fn has_pending_updates(&self) -> bool {
        !self.updates.borrow().is_empty() || self.pending_element.borrow().is_some()
    }

    fn take_pending(&self) -> (Vec<NodeId>, Option<Rc<Descriptor>>) {
        (
            std::mem::take(&mut *self.updates.borrow_mut()),
            self.pending_element.borrow_mut().take(),
        )
    }

    fn ensure_root_is_scheduled(&self) {
        if self.batch_depth.get() > 0 {
            return;
        }
        let mut task = self.render_task.borrow_mut();
        if task.is_some() {
            return;
        }
        let weak = self.this.clone();
        *task = Some(self.scheduler.schedule_callback(
            self.options.render_priority,
            Callback::new(move |did_timeout| Self::perform_concurrent_work(weak, did_timeout)),
        ));
    }

    fn perform_concurrent_work(weak: Weak<Self>, did_timeout: bool) -> Option<Callback> {
        let shared = weak.upgrade()?;
        shared.flush_passive_effects();
        let (updates, element) = shared.take_pending();
        let result = {
            let scheduler = shared.scheduler.clone();
            let should_yield = move || scheduler.should_yield_to_host();
            let mut root = shared.root.borrow_mut();
            Self::render(&mut root, updates, element, did_timeout, &should_yield)
        };
        match result {
            Ok(WorkStatus::Yielded) => {
                log::debug!("render yielded");
                Some(Callback::new(move |did_timeout| {
                    Self::perform_concurrent_work(weak, did_timeout)
                }))
            }
            Ok(status) => {
                *shared.render_task.borrow_mut() = None;
                match shared.count_nested_commit(&status) {
                    Ok(()) => shared.finish(status, true),
                    Err(err) => {
                        shared.finish(status, false);
                        shared.halt_nested_updates();
                        shared.record_error(err);
                    }
                }
                None
            }
            Err(err) => {
                *shared.render_task.borrow_mut() = None;
                shared.record_error(err);
                None
            }
        }
    }

    fn render(
        root: &mut FiberRoot<H>,
        mut updates: Vec<NodeId>,
        element: Option<Rc<Descriptor>>,
        did_timeout: bool,
        should_yield: &dyn Fn() -> bool,
    ) -> Result<WorkStatus, RenderError> {
        if let Some(element) = element {
            updates.push(root.set_element(element)?);
        }
        root.perform_work(&updates, did_timeout, should_yield)
    }

    /// Tracks commits whose updates were queued by effects of the previous
    /// commit. Any commit without such updates resets the count.
    fn count_nested_commit(&self, status: &WorkStatus) -> Result<(), RenderError> {
        if !matches!(status, WorkStatus::Committed(_)) {
            return Ok(());
        }
        if !self.effect_updates.replace(false) {
            self.nested_commits.set(0);
            return Ok(());
        }
        let nested = self.nested_commits.get() + 1;
        if nested >= NESTED_UPDATE_LIMIT {
            return Err(RenderError::NestedUpdateLimit {
                limit: NESTED_UPDATE_LIMIT,
            });
        }
        self.nested_commits.set(nested);
        Ok(())
    }

    fn run_effects(&self, f: impl FnOnce()) {
        let outer = self.in_effects.replace(true);
        f();
        self.in_effects.set(outer);
    }

    fn finish(&self, status: WorkStatus, reschedule: bool) {
        if let WorkStatus::Committed(outcome) = status {
            let passive_pending = outcome.passive_pending;
            self.run_effects(|| outcome.run_layout());
            if passive_pending {
                self.schedule_passive_flush();
            }
        }
        if reschedule && self.has_pending_updates() {
            self.ensure_root_is_scheduled();
        }
    }

    /// Drops queued updates after a commit cascade hits the nested limit.
    /// Updates raised by effects are ignored until one arrives from outside.
    fn halt_nested_updates(&self) {
        self.cancel_render_task();
        let (updates, element) = self.take_pending();
        log::warn!(
            "dropping {} queued updates after {NESTED_UPDATE_LIMIT} nested commits",
            updates.len() + usize::from(element.is_some())
        );
        self.effect_updates.set(false);
        self.nested_commits.set(0);
        self.halted.set(true);
    }

    fn record_error(&self, err: RenderError) {
        log::error!("render failed: {err}");
        *self.last_error.borrow_mut() = Some(err);
    }

    fn schedule_passive_flush(&self) {
        let mut task = self.passive_task.borrow_mut();
        if task.is_some() {
            return;
        }
        let weak = self.this.clone();
        *task = Some(self.scheduler.schedule_callback(
            self.options.passive_priority,
            Callback::new(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.flush_passive_effects();
                }
                None
            }),
        ));
    }

    fn flush_passive_effects(&self) {
        let task = self.passive_task.borrow_mut().take();
        if let Some(task) = task {
            self.scheduler.cancel_callback(&task);
        }
        let pending = self.root.borrow_mut().take_pending_passive();
        self.run_effects(|| pending.run());
    }

    fn cancel_render_task(&self) {
        let task = self.render_task.borrow_mut().take();
        if let Some(task) = task {
            self.scheduler.cancel_callback(&task);
        }
    }
}

impl<H: Host + 'static> Renderer<H> {
    pub fn new(host: H, container: HostId, scheduler: Scheduler) -> Self {
        Self::with_options(host, container, scheduler, RootOptions::default())
    }

    pub fn with_options(
        host: H,
        container: HostId,
        scheduler: Scheduler,
        options: RootOptions,
    ) -> Self {
        let shared = Rc::new_cyclic(|this: &Weak<RootShared<H>>| {
            let sink: Weak<dyn UpdateSink> = this.clone();
            RootShared {
                root: RefCell::new(FiberRoot::new(host, container, sink)),
                updates: RefCell::new(Vec::new()),
                pending_element: RefCell::new(None),
                scheduler,
                options,
                render_task: RefCell::new(None),
                passive_task: RefCell::new(None),
                last_error: RefCell::new(None),
                batch_depth: Cell::new(0),
                in_effects: Cell::new(false),
                effect_updates: Cell::new(false),
                nested_commits: Cell::new(0),
                halted: Cell::new(false),
                this: this.clone(),
            }
        });
        Self { shared }
    }

    /// Replaces the rendered tree and schedules a render.
    pub fn update_root(&self, element: impl Into<Descriptor>) {
        self.shared.halted.set(false);
        *self.shared.pending_element.borrow_mut() = Some(Rc::new(element.into()));
        log::debug!("root update scheduled");
        self.shared.ensure_root_is_scheduled();
    }

    /// Renders and commits all pending updates now, without yielding.
    /// Passive effects of earlier passes run before each pass; those of the
    /// final commit stay scheduled.
    ///
    /// Fails with [`RenderError::NestedUpdateLimit`] when commits keep
    /// queueing updates; the queued updates are dropped.
    pub fn flush_sync(&self) -> Result<(), RenderError> {
        self.shared.flush_passive_effects();
        for _ in 0..NESTED_UPDATE_LIMIT {
            let in_flight = self.shared.root.borrow().is_rendering();
            if !in_flight && !self.shared.has_pending_updates() {
                return Ok(());
            }
            self.shared.flush_passive_effects();
            let (updates, element) = self.shared.take_pending();
            self.shared.effect_updates.set(false);
            let result = {
                let mut root = self.shared.root.borrow_mut();
                RootShared::render(&mut root, updates, element, true, &|| false)
            };
            self.shared.cancel_render_task();
            self.shared.finish(result?, false);
        }
        if !self.shared.has_pending_updates() {
            return Ok(());
        }
        self.shared.halt_nested_updates();
        Err(RenderError::NestedUpdateLimit {
            limit: NESTED_UPDATE_LIMIT,
        })
    }

    /// Runs any passive effects left by earlier commits.
    pub fn flush_passive_effects(&self) {
        self.shared.flush_passive_effects();
    }

    /// Defers scheduling until `f` returns, so its updates share one render.
    pub fn batched_updates<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = &self.shared.batch_depth;
        depth.set(depth.get() + 1);
        let result = f();
        depth.set(depth.get() - 1);
        if depth.get() == 0 && self.shared.has_pending_updates() {
            self.shared.ensure_root_is_scheduled();
        }
        result
    }

    /// Renders an empty tree, running every cleanup.
    pub fn unmount(&self) -> Result<(), RenderError> {
        self.update_root(Descriptor::Empty);
        self.flush_sync()?;
        self.flush_passive_effects();
        Ok(())
    }

    /// Takes the error of the last failed scheduled render, if any.
    pub fn take_error(&self) -> Option<RenderError> {
        self.shared.last_error.borrow_mut().take()
    }

    pub fn is_render_pending(&self) -> bool {
        self.shared.render_task.borrow().is_some() || self.shared.has_pending_updates()
    }

    pub fn container(&self) -> HostId {
        self.shared.root.borrow().container
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    /// Panics if called from inside a render.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.shared.root.borrow().host)
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.shared.root.borrow_mut().host)
    }

    /// Snapshot of the committed tree, starting at the root node.
    pub fn snapshot(&self) -> Result<NodeSnapshot, RenderError> {
        self.shared.root.borrow().snapshot()
    }
}
