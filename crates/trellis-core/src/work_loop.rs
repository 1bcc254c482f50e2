//! The render session: owns both tree generations and drives units of work.

use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::commit::{CommitOutcome, PendingPassive};
use crate::context::ContextStack;
use crate::descriptor::Descriptor;
use crate::error::RenderError;
use crate::hooks::UpdateSink;
use crate::host::{Host, HostId};
use crate::inspect::{snapshot, NodeSnapshot};
use crate::work_node::{create_root, create_work_in_progress, MemoizedState, NodeArena, NodeId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct ExecutionContext: u8 {
        const RENDER = 0b010;
        const COMMIT = 0b100;
    }
}

/// How far a call to [`FiberRoot::perform_work`] got.
pub(crate) enum WorkStatus {
    /// Nothing was scheduled.
    Idle,
    /// The slice ran out; the in-progress tree is kept for the next call.
    Yielded,
    Committed(CommitOutcome),
}

/// Both generations of one rendered tree plus the in-flight pass state.
pub(crate) struct FiberRoot<H: Host> {
    pub(crate) arena: NodeArena,
    pub(crate) host: H,
    pub(crate) container: HostId,
    pub(crate) current: NodeId,
    pub(crate) wip_root: Option<NodeId>,
    pub(crate) work_in_progress: Option<NodeId>,
    pub(crate) finished_work: Option<NodeId>,
    pub(crate) context: ContextStack,
    /// Nodes allocated by the in-flight pass.
    pub(crate) created: Vec<NodeId>,
    pub(crate) sink: Weak<dyn UpdateSink>,
    pub(crate) pending_passive: PendingPassive,
    pub(crate) execution_context: ExecutionContext,
}

impl<H: Host> FiberRoot<H> {
    pub(crate) fn new(host: H, container: HostId, sink: Weak<dyn UpdateSink>) -> Self {
        let mut arena = NodeArena::default();
        let current = create_root(&mut arena, container);
        Self {
            arena,
            host,
            container,
            current,
            wip_root: None,
            work_in_progress: None,
            finished_work: None,
            context: ContextStack::default(),
            created: Vec::new(),
            sink,
            pending_passive: PendingPassive::default(),
            execution_context: ExecutionContext::empty(),
        }
    }

    /// Replaces the root's pending payload and marks the root dirty.
    /// Returns the root node so callers can queue it as an update.
    pub(crate) fn set_element(&mut self, element: Rc<Descriptor>) -> Result<NodeId, RenderError> {
        let root = self.arena.get_mut(self.current)?;
        root.memoized_state = MemoizedState::Root(element);
        root.has_pending_update = true;
        Ok(self.current)
    }

    /// Flags `updates` on both generations. Returns whether any target was
    /// still mounted.
    pub(crate) fn mark_updates(&mut self, updates: &[NodeId]) -> Result<bool, RenderError> {
        let mut marked = false;
        for &id in updates {
            if !self.arena.contains(id) {
                log::debug!("dropping update for unmounted node {id}");
                continue;
            }
            let node = self.arena.get_mut(id)?;
            node.has_pending_update = true;
            let alternate = node.alternate;
            if let Some(alternate) = alternate.filter(|alt| self.arena.contains(*alt)) {
                self.arena.get_mut(alternate)?.has_pending_update = true;
            }
            marked = true;
        }
        Ok(marked)
    }

    fn root_is_dirty(&self) -> Result<bool, RenderError> {
        Ok(self.arena.get(self.current)?.has_pending_update)
    }

    /// Renders pending updates and commits when the tree completes.
    ///
    /// New updates restart an in-flight pass from the root. With
    /// `did_timeout` the pass runs to completion without consulting
    /// `should_yield`.
    pub(crate) fn perform_work(
        &mut self,
        updates: &[NodeId],
        did_timeout: bool,
        should_yield: &dyn Fn() -> bool,
    ) -> Result<WorkStatus, RenderError> {
        let marked = self.mark_updates(updates)?;
        if self.wip_root.is_none() || marked {
            if !marked && !self.root_is_dirty()? {
                return Ok(WorkStatus::Idle);
            }
            if self.wip_root.is_some() {
                log::debug!("restarting interrupted render");
            }
            self.prepare_fresh_stack()?;
        }

        let result = if did_timeout {
            self.work_loop_sync()
        } else {
            self.work_loop_concurrent(should_yield)
        };
        if let Err(err) = result {
            self.discard_work_in_progress();
            return Err(err);
        }
        if self.work_in_progress.is_some() {
            return Ok(WorkStatus::Yielded);
        }
        self.finished_work = self.wip_root.take();
        self.commit_root().map(WorkStatus::Committed)
    }

    /// Builds the whole work-in-progress tree without committing it.
    #[cfg(test)]
    pub(crate) fn render_root_sync(&mut self) -> Result<NodeId, RenderError> {
        self.prepare_fresh_stack()?;
        if let Err(err) = self.work_loop_sync() {
            self.discard_work_in_progress();
            return Err(err);
        }
        let finished = self.wip_root.take().ok_or(RenderError::MissingNode {
            id: self.current,
        })?;
        self.finished_work = Some(finished);
        Ok(finished)
    }

    pub(crate) fn is_rendering(&self) -> bool {
        self.wip_root.is_some()
    }

    pub(crate) fn take_pending_passive(&mut self) -> PendingPassive {
        std::mem::take(&mut self.pending_passive)
    }

    pub(crate) fn snapshot(&self) -> Result<NodeSnapshot, RenderError> {
        snapshot(&self.arena, self.current)
    }

    fn prepare_fresh_stack(&mut self) -> Result<(), RenderError> {
        self.discard_work_in_progress();
        self.finished_work = None;
        let props = self.arena.get(self.current)?.pending_props.clone();
        let wip_root = create_work_in_progress(&mut self.arena, self.current, props)?;
        self.arena.get_mut(wip_root)?.parent = None;
        self.wip_root = Some(wip_root);
        self.work_in_progress = Some(wip_root);
        Ok(())
    }

    /// Drops an unfinished pass. Nodes it allocated are freed; host nodes it
    /// created are left to the host.
    fn discard_work_in_progress(&mut self) {
        for id in self.created.drain(..) {
            self.arena.remove(id);
        }
        self.context.reset();
        self.wip_root = None;
        self.work_in_progress = None;
        self.execution_context.remove(ExecutionContext::RENDER);
    }

    fn work_loop_sync(&mut self) -> Result<(), RenderError> {
        let previous = self.enter(ExecutionContext::RENDER);
        let mut result = Ok(());
        while let Some(unit) = self.work_in_progress {
            result = self.perform_unit_of_work(unit);
            if result.is_err() {
                break;
            }
        }
        self.execution_context = previous;
        result
    }

    fn work_loop_concurrent(&mut self, should_yield: &dyn Fn() -> bool) -> Result<(), RenderError> {
        let previous = self.enter(ExecutionContext::RENDER);
        let mut result = Ok(());
        while let Some(unit) = self.work_in_progress {
            result = self.perform_unit_of_work(unit);
            if result.is_err() || should_yield() {
                break;
            }
        }
        self.execution_context = previous;
        result
    }

    pub(crate) fn enter(&mut self, context: ExecutionContext) -> ExecutionContext {
        debug_assert!(
            !self.execution_context.contains(context),
            "re-entered {context:?} while already inside it"
        );
        let previous = self.execution_context;
        self.execution_context |= context;
        previous
    }

    fn perform_unit_of_work(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let next = self.begin_work(unit)?;
        let node = self.arena.get_mut(unit)?;
        node.memoized_props = Some(node.pending_props.clone());
        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(unit)?,
        }
        Ok(())
    }

    fn complete_unit_of_work(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let mut completed = unit;
        loop {
            self.complete_work(completed)?;
            let node = self.arena.get(completed)?;
            if let Some(sibling) = node.sibling {
                self.work_in_progress = Some(sibling);
                return Ok(());
            }
            match node.parent {
                Some(parent) => completed = parent,
                None => {
                    self.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/work_loop_tests.rs"]
mod tests;
