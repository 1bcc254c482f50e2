use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_core::{
    Clock, Descriptor, HostId, HostOp, HostScheduler, MemoryHost, Millis, NodeSnapshot,
    RenderError, Renderer, RootOptions, Scheduler, SchedulerConfig,
};

/// Clock driven by the test. Every read advances it by `step` milliseconds,
/// so a non-zero step makes long renders run out of frame budget.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    step: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(step: Millis) -> Self {
        Self {
            now: AtomicI64::new(0),
            step: AtomicI64::new(step),
        }
    }

    pub fn advance(&self, millis: Millis) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_step(&self, step: Millis) {
        self.step.store(step, Ordering::SeqCst);
    }

    /// Current time without advancing.
    pub fn peek(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        let step = self.step.load(Ordering::SeqCst);
        self.now.fetch_add(step, Ordering::SeqCst)
    }
}

/// Host scheduler that only counts callback requests; tests pump slices.
#[derive(Debug, Default)]
pub struct TestHostScheduler {
    requests: AtomicUsize,
}

impl TestHostScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HostScheduler for TestHostScheduler {
    fn request_host_callback(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Headless harness around a [`Renderer`] writing into a [`MemoryHost`].
///
/// Nothing runs until the test pumps the scheduler, either to completion
/// with [`TestRoot::pump_until_idle`] or one slice at a time with
/// [`TestRoot::run_slice`].
pub struct TestRoot {
    renderer: Renderer<MemoryHost>,
    clock: Arc<ManualClock>,
    host_scheduler: Arc<TestHostScheduler>,
}

impl TestRoot {
    /// Root whose clock never moves, so slices never run out of budget.
    pub fn new() -> Self {
        Self::build(0, SchedulerConfig::default(), RootOptions::default())
    }

    /// Root whose clock advances `step` ms on every read. Keep `step` below
    /// the frame interval or slices will yield before running anything.
    pub fn with_time_slicing(step: Millis) -> Self {
        Self::build(step, SchedulerConfig::default(), RootOptions::default())
    }

    pub fn with_options(step: Millis, config: SchedulerConfig, options: RootOptions) -> Self {
        Self::build(step, config, options)
    }

    fn build(step: Millis, config: SchedulerConfig, options: RootOptions) -> Self {
        let clock = Arc::new(ManualClock::with_step(step));
        let host_scheduler = Arc::new(TestHostScheduler::default());
        let scheduler = Scheduler::with_config(clock.clone(), host_scheduler.clone(), config);
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        Self {
            renderer: Renderer::with_options(host, container, scheduler, options),
            clock,
            host_scheduler,
        }
    }

    /// Replaces the tree and pumps until idle.
    pub fn render(&self, element: impl Into<Descriptor>) -> Result<(), RenderError> {
        self.renderer.update_root(element);
        self.pump_until_idle()
    }

    /// Runs scheduled tasks, including passive effect flushes, until the
    /// queue drains. Surfaces the error of a failed render.
    pub fn pump_until_idle(&self) -> Result<(), RenderError> {
        self.renderer.scheduler().flush_all();
        match self.renderer.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs one scheduler slice; returns whether work remains.
    pub fn run_slice(&self) -> bool {
        self.renderer.scheduler().perform_work_until_deadline()
    }

    pub fn html(&self) -> String {
        let container = self.renderer.container();
        self.renderer.with_host(|host| host.inner_html(container))
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<HostId> {
        let container = self.renderer.container();
        self.renderer
            .with_host(|host| host.find_by_tag(container, tag))
    }

    /// Calls the `event` handler of the `index`th `tag` element. Returns
    /// false when there is no such element or handler. Does not pump.
    pub fn fire(&self, tag: &str, index: usize, event: &str) -> bool {
        let Some(&node) = self.find_by_tag(tag).get(index) else {
            return false;
        };
        let handler = self.renderer.with_host(|host| host.handler(node, event));
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.renderer.with_host_mut(MemoryHost::take_ops)
    }

    pub fn snapshot(&self) -> Result<NodeSnapshot, RenderError> {
        self.renderer.snapshot()
    }

    pub fn renderer(&self) -> &Renderer<MemoryHost> {
        &self.renderer
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.renderer.scheduler()
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn host_callback_requests(&self) -> usize {
        self.host_scheduler.requests()
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `TestRoot`.
pub fn run_test_root<R>(f: impl FnOnce(&mut TestRoot) -> R) -> R {
    let mut root = TestRoot::new();
    f(&mut root)
}
