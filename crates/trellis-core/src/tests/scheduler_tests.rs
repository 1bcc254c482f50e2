use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::*;
use crate::test_support::{test_clock, CountingHostScheduler, TestClock};

fn scheduler_with(config: SchedulerConfig) -> (Scheduler, Arc<TestClock>, Arc<CountingHostScheduler>) {
    let clock = test_clock();
    let host = Arc::new(CountingHostScheduler::default());
    let scheduler = Scheduler::with_config(clock.clone(), host.clone(), config);
    (scheduler, clock, host)
}

fn recorder(log: &Rc<RefCell<Vec<i64>>>, value: i64) -> Callback {
    let log = log.clone();
    Callback::new(move |_| {
        log.borrow_mut().push(value);
        None
    })
}

#[test]
fn tasks_run_in_expiration_order() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig {
        user_blocking_timeout: 10,
        normal_timeout: 30,
        low_timeout: 50,
        ..SchedulerConfig::default()
    });
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback(Priority::Low, recorder(&log, 50));
    scheduler.schedule_callback(Priority::UserBlocking, recorder(&log, 10));
    scheduler.schedule_callback(Priority::Normal, recorder(&log, 30));

    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![10, 30, 50]);
    assert!(!scheduler.has_pending_work());
}

#[test]
fn equal_expirations_run_in_insertion_order() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    for value in 0..4 {
        scheduler.schedule_callback(Priority::Normal, recorder(&log, value));
    }
    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn later_start_time_orders_after_same_priority() {
    let (scheduler, clock, _host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let late = scheduler.schedule_callback(Priority::Normal, recorder(&log, 1));
    clock.set(100);
    let early_deadline = scheduler.schedule_callback(Priority::UserBlocking, recorder(&log, 2));
    assert_eq!(late.expiration_time(), 5000);
    assert_eq!(early_deadline.expiration_time(), 350);
    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![2, 1]);
}

#[test]
fn cancelled_tasks_are_skipped() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let first = scheduler.schedule_callback(Priority::Normal, recorder(&log, 1));
    scheduler.schedule_callback(Priority::Normal, recorder(&log, 2));
    scheduler.cancel_callback(&first);
    assert!(first.is_done());
    assert_eq!(scheduler.pending_task_count(), 2);

    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![2]);
    assert_eq!(scheduler.pending_task_count(), 0);
}

#[test]
fn continuation_keeps_the_task_and_yields() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let inner_log = log.clone();
    let task = scheduler.schedule_callback(
        Priority::Normal,
        Callback::new(move |_| {
            inner_log.borrow_mut().push(1);
            let inner_log = inner_log.clone();
            Some(Callback::new(move |_| {
                inner_log.borrow_mut().push(2);
                None
            }))
        }),
    );
    scheduler.schedule_callback(Priority::Low, recorder(&log, 3));

    assert!(scheduler.perform_work_until_deadline());
    assert_eq!(*log.borrow(), vec![1]);
    assert!(!task.is_done());

    assert!(!scheduler.perform_work_until_deadline());
    assert_eq!(*log.borrow(), vec![1, 2, 3]);
    assert!(task.is_done());
}

#[test]
fn yields_when_the_frame_budget_is_spent() {
    let (scheduler, clock, host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let slow_log = log.clone();
    let slow_clock = clock.clone();
    scheduler.schedule_callback(
        Priority::Normal,
        Callback::new(move |_| {
            slow_clock.set(10);
            slow_log.borrow_mut().push(1);
            None
        }),
    );
    scheduler.schedule_callback(Priority::Normal, recorder(&log, 2));
    assert_eq!(host.requests.load(Ordering::SeqCst), 1);

    assert!(scheduler.perform_work_until_deadline());
    assert_eq!(*log.borrow(), vec![1]);
    assert_eq!(host.requests.load(Ordering::SeqCst), 2);

    assert!(!scheduler.perform_work_until_deadline());
    assert_eq!(*log.borrow(), vec![1, 2]);
    assert_eq!(host.requests.load(Ordering::SeqCst), 2);
}

#[test]
fn expired_tasks_ignore_the_budget() {
    let (scheduler, clock, _host) = scheduler_with(SchedulerConfig::default());
    let timeouts = Rc::new(RefCell::new(Vec::new()));
    for step in [10, 20] {
        let clock = clock.clone();
        let timeouts = timeouts.clone();
        scheduler.schedule_callback(
            Priority::Immediate,
            Callback::new(move |did_timeout| {
                clock.set(step);
                timeouts.borrow_mut().push(did_timeout);
                None
            }),
        );
    }
    assert!(!scheduler.perform_work_until_deadline());
    assert_eq!(*timeouts.borrow(), vec![true, true]);
}

#[test]
fn tasks_scheduled_during_a_slice_do_not_request_the_host() {
    let (scheduler, _clock, host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let nested = scheduler.clone();
    let nested_log = log.clone();
    scheduler.schedule_callback(
        Priority::Normal,
        Callback::new(move |_| {
            nested.schedule_callback(Priority::Normal, recorder(&nested_log, 2));
            nested_log.borrow_mut().push(1);
            None
        }),
    );
    assert_eq!(host.requests.load(Ordering::SeqCst), 1);
    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![1, 2]);
    assert_eq!(host.requests.load(Ordering::SeqCst), 1);
}

#[test]
fn current_priority_is_visible_inside_a_task() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    let seen = Rc::new(Cell::new(None));
    let (probe, observed) = (scheduler.clone(), seen.clone());
    scheduler.schedule_callback(
        Priority::UserBlocking,
        Callback::new(move |_| {
            observed.set(probe.current_priority_level());
            None
        }),
    );
    assert_eq!(scheduler.current_priority_level(), None);
    scheduler.flush_all();
    assert_eq!(seen.get(), Some(Priority::UserBlocking));
    assert_eq!(scheduler.current_priority_level(), None);
}

#[test]
fn slices_without_a_requested_callback_do_nothing() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    assert!(!scheduler.perform_work_until_deadline());
}

#[test]
fn cancelling_a_running_task_drops_its_continuation() {
    let (scheduler, _clock, _host) = scheduler_with(SchedulerConfig::default());
    let log = Rc::new(RefCell::new(Vec::new()));
    let slot: Rc<RefCell<Option<TaskHandle>>> = Rc::default();
    let task = {
        let scheduler = scheduler.clone();
        let slot = slot.clone();
        let log = log.clone();
        scheduler.clone().schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                log.borrow_mut().push(1);
                if let Some(own) = slot.borrow().as_ref() {
                    scheduler.cancel_callback(own);
                }
                let log = log.clone();
                Some(Callback::new(move |_| {
                    log.borrow_mut().push(2);
                    None
                }))
            }),
        )
    };
    *slot.borrow_mut() = Some(task.clone());
    scheduler.schedule_callback(Priority::Low, recorder(&log, 3));

    scheduler.flush_all();
    assert_eq!(*log.borrow(), vec![1, 3]);
    assert!(task.is_done());
    assert!(!scheduler.has_pending_work());
}
