//! Cooperative priority scheduler.
//!
//! Tasks sit in a min-heap ordered by expiration time. A slice runs tasks
//! until the host says the frame budget is spent; expired tasks run
//! regardless. A callback may hand back a continuation, which keeps the
//! task's place in the queue.

mod min_heap;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub use min_heap::{HeapNode, MinHeap};

use crate::platform::{Clock, HostScheduler, Millis};

/// Ordered from most to least urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Frame budget and per-priority timeouts, all in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub frame_interval: Millis,
    pub immediate_timeout: Millis,
    pub user_blocking_timeout: Millis,
    pub normal_timeout: Millis,
    pub low_timeout: Millis,
    pub idle_timeout: Millis,
}

impl SchedulerConfig {
    pub fn timeout(&self, priority: Priority) -> Millis {
        match priority {
            Priority::Immediate => self.immediate_timeout,
            Priority::UserBlocking => self.user_blocking_timeout,
            Priority::Normal => self.normal_timeout,
            Priority::Low => self.low_timeout,
            Priority::Idle => self.idle_timeout,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval: 5,
            immediate_timeout: -1,
            user_blocking_timeout: 250,
            normal_timeout: 5000,
            low_timeout: 10000,
            // max 31-bit integer
            idle_timeout: 1_073_741_823,
        }
    }
}

/// Task body. Receives whether the task had expired when it started and may
/// return a continuation to run later under the same task.
pub struct Callback(Box<dyn FnOnce(bool) -> Option<Callback>>);

impl Callback {
    pub fn new(callback: impl FnOnce(bool) -> Option<Callback> + 'static) -> Self {
        Self(Box::new(callback))
    }

    fn call(self, did_timeout: bool) -> Option<Callback> {
        (self.0)(did_timeout)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

struct Task {
    id: u64,
    priority: Priority,
    start_time: Millis,
    expiration_time: Millis,
    callback: RefCell<Option<Callback>>,
    cancelled: Cell<bool>,
}

impl HeapNode for Rc<Task> {
    fn sort_index(&self) -> Millis {
        self.expiration_time
    }

    fn id(&self) -> u64 {
        self.id
    }
}

/// Handle returned by [`Scheduler::schedule_callback`].
#[derive(Clone)]
pub struct TaskHandle(Rc<Task>);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn priority(&self) -> Priority {
        self.0.priority
    }

    pub fn start_time(&self) -> Millis {
        self.0.start_time
    }

    pub fn expiration_time(&self) -> Millis {
        self.0.expiration_time
    }

    /// True once the task was cancelled or has finished.
    pub fn is_done(&self) -> bool {
        self.0.cancelled.get() || self.0.callback.borrow().is_none()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.0.id)
            .field("priority", &self.0.priority)
            .field("expiration_time", &self.0.expiration_time)
            .finish()
    }
}

struct SchedulerInner {
    queue: RefCell<MinHeap<Rc<Task>>>,
    next_task_id: Cell<u64>,
    clock: Arc<dyn Clock>,
    host: Arc<dyn HostScheduler>,
    config: SchedulerConfig,
    current_priority: Cell<Option<Priority>>,
    start_time: Cell<Millis>,
    is_host_callback_scheduled: Cell<bool>,
    is_performing_work: Cell<bool>,
    is_message_loop_running: Cell<bool>,
}

/// Single-threaded scheduler handle. Clones share one queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, host: Arc<dyn HostScheduler>) -> Self {
        Self::with_config(clock, host, SchedulerConfig::default())
    }

    pub fn with_config(
        clock: Arc<dyn Clock>,
        host: Arc<dyn HostScheduler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queue: RefCell::new(MinHeap::new()),
                next_task_id: Cell::new(1),
                clock,
                host,
                config,
                current_priority: Cell::new(None),
                start_time: Cell::new(0),
                is_host_callback_scheduled: Cell::new(false),
                is_performing_work: Cell::new(false),
                is_message_loop_running: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn now(&self) -> Millis {
        self.inner.clock.now()
    }

    pub fn schedule_callback(&self, priority: Priority, callback: Callback) -> TaskHandle {
        let inner = &self.inner;
        let start_time = self.now();
        let expiration_time = start_time + inner.config.timeout(priority);
        let id = inner.next_task_id.get();
        inner.next_task_id.set(id + 1);
        let task = Rc::new(Task {
            id,
            priority,
            start_time,
            expiration_time,
            callback: RefCell::new(Some(callback)),
            cancelled: Cell::new(false),
        });
        inner.queue.borrow_mut().push(task.clone());
        log::trace!("scheduled task {id} at {priority:?}, expires {expiration_time}");

        if !inner.is_host_callback_scheduled.get() && !inner.is_performing_work.get() {
            inner.is_host_callback_scheduled.set(true);
            self.request_host_callback();
        }
        TaskHandle(task)
    }

    /// Cancels a task. The queue entry is dropped lazily when it reaches the
    /// top. A running task finishes its current call, but any continuation it
    /// returns is discarded.
    pub fn cancel_callback(&self, task: &TaskHandle) {
        if task.0.cancelled.replace(true) {
            return;
        }
        task.0.callback.borrow_mut().take();
        log::trace!("cancelled task {}", task.0.id);
    }

    /// Priority of the task currently executing, if any.
    pub fn current_priority_level(&self) -> Option<Priority> {
        self.inner.current_priority.get()
    }

    pub fn should_yield_to_host(&self) -> bool {
        let elapsed = self.now() - self.inner.start_time.get();
        self.inner
            .host
            .should_yield(elapsed, self.inner.config.frame_interval)
    }

    pub fn has_pending_work(&self) -> bool {
        !self.inner.queue.borrow().is_empty()
    }

    pub fn pending_task_count(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Entry point for the host's macrotask. Runs one slice and returns
    /// whether more work remains; if so another host callback was requested.
    pub fn perform_work_until_deadline(&self) -> bool {
        let inner = &self.inner;
        if !inner.is_message_loop_running.get() {
            return false;
        }
        let current_time = self.now();
        inner.start_time.set(current_time);
        let has_more_work = self.flush_work(current_time);
        if has_more_work {
            inner.host.request_host_callback();
        } else {
            inner.is_message_loop_running.set(false);
        }
        has_more_work
    }

    /// Runs slices back to back until the queue drains.
    pub fn flush_all(&self) {
        loop {
            let current_time = self.now();
            self.inner.start_time.set(current_time);
            if !self.flush_work(current_time) {
                break;
            }
        }
        self.inner.is_message_loop_running.set(false);
    }

    fn request_host_callback(&self) {
        if !self.inner.is_message_loop_running.get() {
            self.inner.is_message_loop_running.set(true);
            self.inner.host.request_host_callback();
        }
    }

    fn flush_work(&self, initial_time: Millis) -> bool {
        let inner = &self.inner;
        inner.is_host_callback_scheduled.set(false);
        inner.is_performing_work.set(true);
        let previous_priority = inner.current_priority.get();
        let has_more_work = self.work_loop(initial_time);
        inner.current_priority.set(previous_priority);
        inner.is_performing_work.set(false);
        has_more_work
    }

    fn pop_if_top(&self, task: &Rc<Task>) {
        let mut queue = self.inner.queue.borrow_mut();
        if queue.peek().is_some_and(|top| Rc::ptr_eq(top, task)) {
            queue.pop();
        }
    }

    fn work_loop(&self, initial_time: Millis) -> bool {
        let inner = &self.inner;
        let mut current_time = initial_time;
        loop {
            let Some(task) = inner.queue.borrow().peek().cloned() else {
                return false;
            };
            if task.expiration_time > current_time && self.should_yield_to_host() {
                return true;
            }
            let callback = task.callback.borrow_mut().take();
            let Some(callback) = callback else {
                inner.queue.borrow_mut().pop();
                continue;
            };
            inner.current_priority.set(Some(task.priority));
            let did_timeout = task.expiration_time <= current_time;
            log::trace!("running task {} (timed out: {did_timeout})", task.id);
            let continuation = callback.call(did_timeout);
            current_time = self.now();
            match continuation {
                Some(continuation) if !task.cancelled.get() => {
                    *task.callback.borrow_mut() = Some(continuation);
                    return true;
                }
                Some(_) => {
                    log::trace!("dropped continuation of cancelled task {}", task.id);
                    self.pop_if_top(&task);
                }
                None => self.pop_if_top(&task),
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_task_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
#[path = "../tests/scheduler_tests.rs"]
mod tests;
