//! Shared fixtures for unit tests that drive a render session directly.

use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::error::RenderError;
use crate::hooks::{detached_sink, UpdateSink};
use crate::host::MemoryHost;
use crate::platform::{Clock, HostScheduler, Millis};
use crate::work_loop::{FiberRoot, WorkStatus};
use crate::work_node::{EffectFlags, NodeArena, NodeId};

#[derive(Default)]
pub(crate) struct TestClock {
    now: AtomicI64,
}

impl TestClock {
    pub(crate) fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct CountingHostScheduler {
    pub(crate) requests: AtomicUsize,
}

impl HostScheduler for CountingHostScheduler {
    fn request_host_callback(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn test_clock() -> Arc<TestClock> {
    Arc::new(TestClock::default())
}

/// Collects dispatched updates so a test can feed them back to the root.
#[derive(Default)]
pub(crate) struct RecordingSink {
    updates: std::cell::RefCell<Vec<NodeId>>,
}

impl RecordingSink {
    pub(crate) fn take(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.updates.borrow_mut())
    }
}

impl UpdateSink for RecordingSink {
    fn schedule_update(&self, node: NodeId) {
        self.updates.borrow_mut().push(node);
    }
}

pub(crate) fn new_root() -> FiberRoot<MemoryHost> {
    new_root_with_sink(detached_sink())
}

pub(crate) fn new_root_with_sink(sink: Weak<dyn UpdateSink>) -> FiberRoot<MemoryHost> {
    let mut host = MemoryHost::new();
    let container = host.create_container("root");
    FiberRoot::new(host, container, sink)
}

pub(crate) fn sink_of(sink: &Rc<RecordingSink>) -> Weak<dyn UpdateSink> {
    let weak: Weak<RecordingSink> = Rc::downgrade(sink);
    weak
}

/// Renders and commits `descriptor`, running layout work.
pub(crate) fn mount(
    root: &mut FiberRoot<MemoryHost>,
    descriptor: impl Into<Descriptor>,
) -> Result<(), RenderError> {
    root.set_element(Rc::new(descriptor.into()))?;
    render_and_commit(root, &[])
}

pub(crate) fn render_and_commit(
    root: &mut FiberRoot<MemoryHost>,
    updates: &[NodeId],
) -> Result<(), RenderError> {
    if let WorkStatus::Committed(outcome) = root.perform_work(updates, true, &|| false)? {
        outcome.run_layout();
    }
    Ok(())
}

/// Renders `descriptor` without committing and returns the finished root.
pub(crate) fn render_only(
    root: &mut FiberRoot<MemoryHost>,
    descriptor: impl Into<Descriptor>,
) -> Result<NodeId, RenderError> {
    root.set_element(Rc::new(descriptor.into()))?;
    root.render_root_sync()
}

pub(crate) fn html(root: &FiberRoot<MemoryHost>) -> String {
    root.host.inner_html(root.container)
}

/// Children of `id` as `(key, flags)` pairs in sibling order.
pub(crate) fn child_flags(
    arena: &NodeArena,
    id: NodeId,
) -> Vec<(Option<String>, EffectFlags)> {
    arena
        .children(id)
        .unwrap()
        .into_iter()
        .map(|child| {
            let node = arena.get(child).unwrap();
            (node.key.as_deref().map(str::to_owned), node.flags)
        })
        .collect()
}

/// Every node reachable from `id`, pre-order.
pub(crate) fn walk(arena: &NodeArena, id: NodeId) -> Vec<NodeId> {
    let mut out = vec![id];
    for child in arena.children(id).unwrap() {
        out.extend(walk(arena, child));
    }
    out
}
