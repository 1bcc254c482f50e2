use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::prelude::*;
use trellis_core::{Priority, RenderError, RootOptions, SchedulerConfig, SetState, WorkTag};
use trellis_testing::TestRoot;

type Log = Rc<RefCell<Vec<String>>>;

fn counter(renders: &Rc<Cell<usize>>) -> FunctionComponent {
    let renders = renders.clone();
    FunctionComponent::new("Counter", move |hooks, _| {
        renders.set(renders.get() + 1);
        let (count, set) = hooks.use_state(|| 0_i64);
        element("button")
            .on("click", move || set.update(|count| count + 1))
            .text(count.to_string())
            .build()
    })
}

#[test]
fn clicks_rerender_through_the_scheduler() {
    let renders = Rc::new(Cell::new(0));
    let root = TestRoot::new();
    root.render(counter(&renders).element()).expect("initial render");
    assert_eq!(root.html(), "<button>0</button>");

    assert!(root.fire("button", 0, "click"));
    assert!(root.renderer().is_render_pending());
    assert_eq!(root.html(), "<button>0</button>");

    root.pump_until_idle().expect("update render");
    assert_eq!(root.html(), "<button>1</button>");
    assert_eq!(renders.get(), 2);
}

#[test]
fn updates_before_a_render_share_one_pass() {
    let renders = Rc::new(Cell::new(0));
    let root = TestRoot::new();
    root.render(counter(&renders).element()).expect("initial render");

    root.renderer().batched_updates(|| {
        root.fire("button", 0, "click");
        root.fire("button", 0, "click");
        root.fire("button", 0, "click");
    });
    root.pump_until_idle().expect("batched render");
    assert_eq!(root.html(), "<button>3</button>");
    assert_eq!(renders.get(), 2);
}

fn effect_logger(log: &Log) -> FunctionComponent {
    let log = log.clone();
    FunctionComponent::new("Logger", move |hooks, props| {
        let label = props.get_str("label").unwrap_or_default().to_owned();
        let passive_log = log.clone();
        let passive_label = label.clone();
        hooks.use_effect(
            move || {
                passive_log.borrow_mut().push(format!("passive {passive_label}"));
                let log = passive_log.clone();
                cleanup(move || log.borrow_mut().push(format!("passive cleanup {passive_label}")))
            },
            deps![label.as_str()],
        );
        let layout_log = log.clone();
        let layout_label = label.clone();
        hooks.use_layout_effect(
            move || {
                layout_log.borrow_mut().push(format!("layout {layout_label}"));
                let log = layout_log.clone();
                cleanup(move || log.borrow_mut().push(format!("layout cleanup {layout_label}")))
            },
            deps![label.as_str()],
        );
        Descriptor::text(label)
    })
}

#[test]
fn passive_effects_wait_for_a_later_task() {
    let log: Log = Rc::default();
    let logger = effect_logger(&log);
    let root = TestRoot::new();

    root.renderer().update_root(logger.element().prop("label", "a"));
    root.renderer().flush_sync().expect("sync render");
    assert_eq!(root.html(), "a");
    assert_eq!(*log.borrow(), vec!["layout a"]);

    root.pump_until_idle().expect("passive flush");
    assert_eq!(*log.borrow(), vec!["layout a", "passive a"]);
}

#[test]
fn pending_passive_effects_flush_before_the_next_render() {
    let log: Log = Rc::default();
    let logger = effect_logger(&log);
    let root = TestRoot::new();

    root.renderer().update_root(logger.element().prop("label", "a"));
    root.renderer().flush_sync().expect("first render");
    root.renderer().update_root(logger.element().prop("label", "b"));
    root.renderer().flush_sync().expect("second render");
    assert_eq!(
        *log.borrow(),
        vec![
            "layout a",
            "passive a",
            "layout cleanup a",
            "layout b",
        ]
    );
    root.pump_until_idle().expect("passive flush");
    assert_eq!(log.borrow()[4..], ["passive cleanup a", "passive b"]);
}

#[test]
fn unmount_runs_every_cleanup() {
    let log: Log = Rc::default();
    let logger = effect_logger(&log);
    let root = TestRoot::new();
    root.render(
        element("div")
            .child(logger.element().prop("label", "x"))
            .child(logger.element().prop("label", "y")),
    )
    .expect("mount");
    log.borrow_mut().clear();

    root.renderer().unmount().expect("unmount");
    assert_eq!(root.html(), "");
    let log = log.borrow();
    for expected in [
        "layout cleanup x",
        "layout cleanup y",
        "passive cleanup x",
        "passive cleanup y",
    ] {
        assert!(log.iter().any(|entry| entry == expected), "missing {expected}");
    }
    assert_eq!(log.len(), 4);
}

#[test]
fn child_removed_within_one_flush_sync_still_runs_its_cleanup() {
    let log: Log = Rc::default();
    let child = {
        let log = log.clone();
        FunctionComponent::new("Child", move |hooks, _| {
            let log = log.clone();
            hooks.use_effect(
                move || {
                    log.borrow_mut().push(String::from("child mount"));
                    cleanup(move || log.borrow_mut().push(String::from("child cleanup")))
                },
                deps![],
            );
            Descriptor::Empty
        })
    };
    let parent = FunctionComponent::new("Parent", move |hooks, _| {
        let (show, set) = hooks.use_state(|| true);
        hooks.use_layout_effect(
            move || {
                if show {
                    set.set(false);
                }
            },
            deps![show],
        );
        if show {
            child.element().build()
        } else {
            Descriptor::Empty
        }
    });
    let root = TestRoot::new();

    root.renderer().update_root(parent.element());
    root.renderer().flush_sync().expect("sync render");
    root.renderer().flush_passive_effects();
    assert_eq!(*log.borrow(), vec!["child mount", "child cleanup"]);
}

#[test]
fn passive_effects_that_always_update_stop_at_the_nested_limit() {
    let ticker = FunctionComponent::new("Ticker", |hooks, _| {
        let (ticks, set) = hooks.use_state(|| 0_i64);
        hooks.use_effect(move || set.update(|ticks| ticks + 1), None);
        Descriptor::from(ticks)
    });
    let root = TestRoot::new();

    let err = root.render(ticker.element()).expect_err("runaway effect");
    assert_eq!(err, RenderError::NestedUpdateLimit { limit: 50 });
    assert!(!root.renderer().is_render_pending());
    assert_eq!(root.html(), "50");
}

#[test]
fn flush_sync_reports_layout_effects_that_always_update() {
    let ticker = FunctionComponent::new("Ticker", |hooks, _| {
        let (ticks, set) = hooks.use_state(|| 0_i64);
        hooks.use_layout_effect(move || set.update(|ticks| ticks + 1), None);
        Descriptor::from(ticks)
    });
    let root = TestRoot::new();

    root.renderer().update_root(ticker.element());
    assert_eq!(
        root.renderer().flush_sync(),
        Err(RenderError::NestedUpdateLimit { limit: 50 })
    );
    assert!(!root.renderer().is_render_pending());
    root.pump_until_idle().expect("nothing left to render");
}

#[test]
fn effects_can_schedule_follow_up_renders() {
    let root = TestRoot::new();
    let loader = FunctionComponent::new("Loader", |hooks, _| {
        let (value, set) = hooks.use_state(|| String::from("loading"));
        hooks.use_effect(move || set.set(String::from("ready")), deps![]);
        Descriptor::text(value)
    });
    root.render(loader.element()).expect("render");
    assert_eq!(root.html(), "ready");
}

#[test]
fn time_sliced_renders_commit_once_complete() {
    let root = TestRoot::with_time_slicing(1);
    let rows = (0..40).map(|i| element("li").key(i.to_string()).text(i.to_string()).build());
    root.renderer().update_root(element("ul").children(rows));

    assert!(root.run_slice());
    assert_eq!(root.html(), "");
    let mut slices = 1;
    while root.run_slice() {
        slices += 1;
        assert!(slices < 1_000, "render never finished");
    }
    assert!(slices > 2);
    assert_eq!(root.find_by_tag("li").len(), 40);
}

#[test]
fn a_newer_root_update_replaces_an_interrupted_render() {
    let root = TestRoot::with_time_slicing(1);
    let rows = (0..40).map(|i| element("li").text(i.to_string()).build());
    root.renderer().update_root(element("ul").children(rows));
    assert!(root.run_slice());

    root.renderer().update_root(element("p").text("replaced"));
    root.pump_until_idle().expect("restarted render");
    assert_eq!(root.html(), "<p>replaced</p>");
}

#[test]
fn render_priority_follows_the_options() {
    let root = TestRoot::with_options(
        0,
        SchedulerConfig::default(),
        RootOptions {
            render_priority: Priority::UserBlocking,
            passive_priority: Priority::Idle,
        },
    );
    let seen = Rc::new(Cell::new(None));
    let observer = {
        let scheduler = root.scheduler().clone();
        let seen = seen.clone();
        FunctionComponent::new("Observer", move |_, _| {
            seen.set(scheduler.current_priority_level());
            Descriptor::Empty
        })
    };
    root.render(observer.element()).expect("render");
    assert_eq!(seen.get(), Some(Priority::UserBlocking));
}

#[test]
fn snapshot_describes_the_committed_tree() {
    let renders = Rc::new(Cell::new(0));
    let counter = counter(&renders);
    let root = TestRoot::new();
    root.render(
        element("main").child(Descriptor::list([
            counter.element().key("first").build(),
            counter.element().key("second").build(),
        ])),
    )
    .expect("render");

    let snapshot = root.snapshot().expect("snapshot");
    assert_eq!(snapshot.tag, WorkTag::Root);
    let main = snapshot.find_by_name("main").expect("main element");
    assert_eq!(main.child_keys(), vec![Some("first"), Some("second")]);
    let first = main.find_by_name("Counter").expect("counter");
    assert_eq!(first.hook_count, 1);
    assert_eq!(first.effect_count, 0);
    assert_eq!(snapshot.count(), 6);
}

#[test]
fn dispatch_after_unmount_is_ignored() {
    let setter: Rc<RefCell<Option<SetState<i64>>>> = Rc::default();
    let slot = setter.clone();
    let holder = FunctionComponent::new("Holder", move |hooks, _| {
        let (value, set) = hooks.use_state(|| 0_i64);
        *slot.borrow_mut() = Some(set);
        Descriptor::from(value)
    });
    let root = TestRoot::new();
    root.render(holder.element()).expect("mount");
    root.render(Descriptor::Empty).expect("unmount");

    setter.borrow().as_ref().expect("setter captured").set(4);
    root.pump_until_idle().expect("stale update");
    assert_eq!(root.html(), "");
}
