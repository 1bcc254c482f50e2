//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `trellis-core`. Applications construct a
//! [`StdRuntime`], hand its [`Scheduler`] to a [`trellis_core::Renderer`],
//! and call [`StdRuntime::pump`] from their event loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use trellis_core::{Clock, HostScheduler, Millis, Scheduler, SchedulerConfig};

/// Overrides the scheduler's frame budget, in milliseconds.
pub const FRAME_INTERVAL_ENV: &str = "TRELLIS_FRAME_INTERVAL_MS";

type WakeFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Host services for a scheduler owned by the current thread.
///
/// Time is measured in milliseconds from construction, which is what task
/// deadlines and slice budgets are computed against. A request for a host
/// callback raises a flag the event loop drains with [`StdHost::take_wake`]
/// and calls the registered wake function, if any, so a parked loop can
/// resume.
pub struct StdHost {
    origin: Instant,
    wake_pending: AtomicBool,
    on_wake: Mutex<Option<WakeFn>>,
}

impl StdHost {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wake_pending: AtomicBool::new(false),
            on_wake: Mutex::new(None),
        }
    }

    /// Clears the pending wake-up, returning whether there was one.
    pub fn take_wake(&self) -> bool {
        self.wake_pending.swap(false, Ordering::AcqRel)
    }

    pub fn on_wake(&self, wake: impl Fn() + Send + Sync + 'static) {
        *self.on_wake.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(wake));
    }

    pub fn clear_on_wake(&self) {
        *self.on_wake.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Milliseconds left until `deadline` on this host's timeline, or zero
    /// once it has passed.
    pub fn remaining_until(&self, deadline: Millis) -> Millis {
        (deadline - self.now()).max(0)
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdHost")
            .field("now", &self.now())
            .field("wake_pending", &self.wake_pending.load(Ordering::Acquire))
            .finish()
    }
}

impl Clock for StdHost {
    fn now(&self) -> Millis {
        Millis::try_from(self.origin.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }
}

impl HostScheduler for StdHost {
    fn request_host_callback(&self) {
        self.wake_pending.store(true, Ordering::Release);
        // Clone out so the wake function may re-enter `on_wake`.
        let wake = self
            .on_wake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(wake) = wake {
            wake();
        }
    }
}

/// Reads [`FRAME_INTERVAL_ENV`] on top of the default configuration.
pub fn scheduler_config_from_env() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    if let Ok(raw) = std::env::var(FRAME_INTERVAL_ENV) {
        match parse_frame_interval(&raw) {
            Some(interval) => config.frame_interval = interval,
            None => log::warn!("ignoring {FRAME_INTERVAL_ENV}={raw:?}: expected a positive integer"),
        }
    }
    config
}

fn parse_frame_interval(raw: &str) -> Option<Millis> {
    raw.trim().parse::<Millis>().ok().filter(|interval| *interval > 0)
}

/// A [`Scheduler`] wired to a [`StdHost`], driven by the caller's loop.
#[derive(Clone)]
pub struct StdRuntime {
    host: Arc<StdHost>,
    scheduler: Scheduler,
}

impl StdRuntime {
    /// Creates a runtime configured from the environment.
    pub fn new() -> Self {
        Self::with_config(scheduler_config_from_env())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let host = Arc::new(StdHost::new());
        let scheduler = Scheduler::with_config(host.clone(), host.clone(), config);
        Self { host, scheduler }
    }

    /// Returns the scheduler to pass to a renderer.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn host(&self) -> Arc<StdHost> {
        Arc::clone(&self.host)
    }

    /// Registers a function called each time the scheduler asks for a slice.
    pub fn set_waker(&self, wake: impl Fn() + Send + Sync + 'static) {
        self.host.on_wake(wake);
    }

    pub fn clear_waker(&self) {
        self.host.clear_on_wake();
    }

    /// Runs one slice if the scheduler asked for one. Returns whether a slice ran.
    pub fn pump(&self) -> bool {
        if !self.host.take_wake() {
            return false;
        }
        self.scheduler.perform_work_until_deadline();
        true
    }

    /// Pumps until no further slice is requested.
    pub fn run_until_idle(&self) {
        let mut slices = 0usize;
        while self.pump() {
            slices += 1;
        }
        log::trace!("ran {slices} scheduler slices");
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("host", &self.host)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use trellis_core::{
        element, Clock, FunctionComponent, HostScheduler, MemoryHost, Renderer, SchedulerConfig,
    };

    use super::{parse_frame_interval, StdHost, StdRuntime};

    #[test]
    fn std_runtime_requests_a_callback_and_renders_state_changes() {
        let runtime = StdRuntime::with_config(SchedulerConfig::default());
        let wakes = Arc::new(AtomicUsize::new(0));
        let counted = wakes.clone();
        runtime.set_waker(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        let renderer = Renderer::new(host, container, runtime.scheduler());

        let setter = Rc::new(RefCell::new(None));
        let slot = setter.clone();
        let counter = FunctionComponent::new("Counter", move |hooks, _| {
            let (count, set) = hooks.use_state(|| 0);
            *slot.borrow_mut() = Some(set);
            element("span").text(count.to_string()).build()
        });
        renderer.update_root(counter.element());
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        runtime.run_until_idle();
        let html = |renderer: &Renderer<MemoryHost>| {
            renderer.with_host(|host| host.inner_html(renderer.container()))
        };
        assert_eq!(html(&renderer), "<span>0</span>");
        assert!(!runtime.pump());

        setter.borrow().as_ref().expect("state captured during render").set(1);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert!(runtime.pump());
        runtime.run_until_idle();
        assert_eq!(html(&renderer), "<span>1</span>");
    }

    #[test]
    fn wake_requests_are_drained_once() {
        let host = StdHost::new();
        assert!(!host.take_wake());
        host.request_host_callback();
        host.request_host_callback();
        assert!(host.take_wake());
        assert!(!host.take_wake());

        let wakes = Arc::new(AtomicUsize::new(0));
        let counted = wakes.clone();
        host.on_wake(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        host.request_host_callback();
        host.clear_on_wake();
        host.request_host_callback();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remaining_time_never_goes_negative() {
        let host = StdHost::new();
        assert_eq!(host.remaining_until(host.now() - 10), 0);
        assert!(host.remaining_until(host.now() + 60_000) > 0);
    }

    #[test]
    fn frame_interval_override_must_be_positive() {
        assert_eq!(parse_frame_interval(" 8 "), Some(8));
        assert_eq!(parse_frame_interval("0"), None);
        assert_eq!(parse_frame_interval("fast"), None);
    }
}
