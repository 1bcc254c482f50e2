//! Platform abstraction traits for scheduler services.
//!
//! The scheduler delegates wake-ups and time to the embedding host so the
//! core crate stays free of `std::time` and threading primitives.

/// Milliseconds on the host's monotonic timeline.
pub type Millis = i64;

/// Provides timing information for the scheduler.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds.
    fn now(&self) -> Millis;
}

/// Bridges the scheduler's message loop to the host event loop.
///
/// Implementations must eventually call
/// [`Scheduler::perform_work_until_deadline`](crate::Scheduler::perform_work_until_deadline)
/// on the thread that owns the scheduler after `request_host_callback`.
pub trait HostScheduler: Send + Sync {
    /// Request a macrotask that drives the scheduler.
    fn request_host_callback(&self);

    /// Decides whether the current slice has used up its budget.
    fn should_yield(&self, elapsed: Millis, frame_interval: Millis) -> bool {
        elapsed >= frame_interval
    }
}

/// Host scheduler that never wakes anything; the owner drives work by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualHostScheduler;

impl HostScheduler for ManualHostScheduler {
    fn request_host_callback(&self) {}
}
