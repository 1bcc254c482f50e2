use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::descriptor::{element, Descriptor, FunctionComponent};
use crate::test_support::{html, mount, new_root_with_sink, render_and_commit, sink_of, walk, RecordingSink};
use crate::work_node::{MemoizedState, WorkTag};

type Log = Rc<RefCell<Vec<String>>>;

fn function_node(root: &crate::work_loop::FiberRoot<crate::MemoryHost>, from: NodeId) -> NodeId {
    walk(&root.arena, from)
        .into_iter()
        .find(|id| root.arena.get(*id).unwrap().tag == WorkTag::FunctionComponent)
        .expect("function component in tree")
}

#[test]
fn effect_hook_pairs_by_position_across_state_changes() {
    let sink = Rc::new(RecordingSink::default());
    let mut root = new_root_with_sink(sink_of(&sink));
    let setter: Rc<RefCell<Option<SetState<i64>>>> = Rc::default();
    let slot = setter.clone();
    let counter = FunctionComponent::new("Counter", move |hooks, _| {
        let (count, set) = hooks.use_state(|| 0_i64);
        *slot.borrow_mut() = Some(set);
        hooks.use_effect(|| (), crate::deps![5]);
        element("span").text(count.to_string()).build()
    });
    mount(&mut root, counter.element()).unwrap();
    assert_eq!(html(&root), "<span>0</span>");

    setter.borrow().as_ref().unwrap().set(1);
    let updates = sink.take();
    assert_eq!(updates.len(), 1);
    assert!(root.mark_updates(&updates).unwrap());
    let finished = root.render_root_sync().unwrap();

    let node = root.arena.get(function_node(&root, finished)).unwrap();
    let MemoizedState::Hooks(hooks) = &node.memoized_state else {
        panic!("expected hook list");
    };
    assert_eq!(hooks.len(), 2);
    assert!(matches!(hooks[0], Hook::Reducer(_)));
    assert!(matches!(
        &hooks[1],
        Hook::Effect { tag: EffectTag::Passive, deps: Some(deps), .. } if deps == &vec![Value::Int(5)]
    ));
    assert!(node.effects.is_empty());
    assert!(!node.flags.contains(EffectFlags::PASSIVE));

    let outcome = root.commit_root().unwrap();
    outcome.run_layout();
    assert_eq!(html(&root), "<span>1</span>");
}

#[test]
fn unchanged_effect_deps_do_not_queue_effects() {
    let mut root = crate::test_support::new_root();
    let runs = Rc::new(Cell::new(0));
    let dep = Rc::new(Cell::new(1_i64));
    let (counted, read_dep) = (runs.clone(), dep.clone());
    let probe = FunctionComponent::new("Probe", move |hooks, _| {
        let counted = counted.clone();
        hooks.use_effect(move || counted.set(counted.get() + 1), crate::deps![read_dep.get()]);
        Descriptor::Empty
    });

    mount(&mut root, probe.element()).unwrap();
    let first = function_node(&root, root.current);
    assert_eq!(root.arena.get(first).unwrap().effects.len(), 1);
    assert!(root.arena.get(first).unwrap().flags.contains(EffectFlags::PASSIVE));
    root.take_pending_passive().run();
    assert_eq!(runs.get(), 1);

    mount(&mut root, probe.element()).unwrap();
    let second = function_node(&root, root.current);
    assert!(root.arena.get(second).unwrap().effects.is_empty());
    assert!(!root.arena.get(second).unwrap().flags.contains(EffectFlags::PASSIVE));
    assert!(root.take_pending_passive().is_empty());

    dep.set(2);
    mount(&mut root, probe.element()).unwrap();
    let third = function_node(&root, root.current);
    assert_eq!(root.arena.get(third).unwrap().effects.len(), 1);
    root.take_pending_passive().run();
    assert_eq!(runs.get(), 2);
}

#[test]
fn cleanups_run_before_the_next_effect_and_on_unmount() {
    let mut root = crate::test_support::new_root();
    let log: Log = Rc::default();
    let step = Rc::new(Cell::new(0_i64));
    let (sink, read_step) = (log.clone(), step.clone());
    let probe = FunctionComponent::new("Probe", move |hooks, _| {
        let current = read_step.get();
        let log = sink.clone();
        hooks.use_effect(
            move || {
                log.borrow_mut().push(format!("passive {current}"));
                let log = log.clone();
                cleanup(move || log.borrow_mut().push(format!("passive cleanup {current}")))
            },
            crate::deps![current],
        );
        let log = sink.clone();
        hooks.use_layout_effect(
            move || {
                log.borrow_mut().push(format!("layout {current}"));
                let log = log.clone();
                cleanup(move || log.borrow_mut().push(format!("layout cleanup {current}")))
            },
            crate::deps![current],
        );
        Descriptor::Empty
    });

    mount(&mut root, probe.element()).unwrap();
    assert_eq!(*log.borrow(), vec!["layout 0"]);
    root.take_pending_passive().run();
    assert_eq!(*log.borrow(), vec!["layout 0", "passive 0"]);

    log.borrow_mut().clear();
    step.set(1);
    mount(&mut root, probe.element()).unwrap();
    root.take_pending_passive().run();
    assert_eq!(
        *log.borrow(),
        vec!["layout cleanup 0", "layout 1", "passive cleanup 0", "passive 1"]
    );

    log.borrow_mut().clear();
    mount(&mut root, Descriptor::Empty).unwrap();
    assert_eq!(*log.borrow(), vec!["layout cleanup 1"]);
    root.take_pending_passive().run();
    assert_eq!(*log.borrow(), vec!["layout cleanup 1", "passive cleanup 1"]);
}

#[test]
fn memo_recomputes_only_when_deps_change() {
    let mut root = crate::test_support::new_root();
    let computed = Rc::new(Cell::new(0));
    let input = Rc::new(Cell::new(3_i64));
    let (count, read) = (computed.clone(), input.clone());
    let square = FunctionComponent::new("Square", move |hooks, _| {
        let value = read.get();
        let count = count.clone();
        let squared = hooks.use_memo(
            move || {
                count.set(count.get() + 1);
                value * value
            },
            crate::deps![value],
        );
        Descriptor::from(*squared)
    });

    mount(&mut root, square.element()).unwrap();
    mount(&mut root, square.element()).unwrap();
    assert_eq!(computed.get(), 1);
    assert_eq!(html(&root), "9");

    input.set(4);
    mount(&mut root, square.element()).unwrap();
    assert_eq!(computed.get(), 2);
    assert_eq!(html(&root), "16");
}

#[test]
fn memo_without_deps_recomputes_every_render() {
    let mut root = crate::test_support::new_root();
    let computed = Rc::new(Cell::new(0));
    let count = computed.clone();
    let always = FunctionComponent::new("Always", move |hooks, _| {
        let count = count.clone();
        hooks.use_memo(move || count.set(count.get() + 1), None);
        Descriptor::Empty
    });
    mount(&mut root, always.element()).unwrap();
    mount(&mut root, always.element()).unwrap();
    assert_eq!(computed.get(), 2);
}

#[test]
fn refs_and_dispatchers_are_stable() {
    let sink = Rc::new(RecordingSink::default());
    let mut root = new_root_with_sink(sink_of(&sink));
    let seen: Rc<RefCell<Vec<(MutableRef<i32>, Dispatch<i32>)>>> = Rc::default();
    let record = seen.clone();
    let component = FunctionComponent::new("Stable", move |hooks, _| {
        let cell = hooks.use_ref(|| 0_i32);
        let (total, dispatch) = hooks.use_reducer(|state: &i32, add: i32| state + add, || 10);
        *cell.borrow_mut() += 1;
        record.borrow_mut().push((cell, dispatch));
        Descriptor::from(total)
    });

    mount(&mut root, component.element()).unwrap();
    let (first_ref, first_dispatch) = seen.borrow()[0].clone();
    first_dispatch.dispatch(5);
    render_and_commit(&mut root, &sink.take()).unwrap();
    assert_eq!(html(&root), "15");

    let (second_ref, second_dispatch) = seen.borrow()[1].clone();
    assert!(first_dispatch.ptr_eq(&second_dispatch));
    assert_eq!(first_ref.get(), 2);
    assert_eq!(second_ref.get(), 2);
}

#[test]
fn state_updates_can_read_the_previous_value() {
    let sink = Rc::new(RecordingSink::default());
    let mut root = new_root_with_sink(sink_of(&sink));
    let setter: Rc<RefCell<Option<SetState<String>>>> = Rc::default();
    let slot = setter.clone();
    let echo = FunctionComponent::new("Echo", move |hooks, _| {
        let (text, set) = hooks.use_state(|| String::from("a"));
        *slot.borrow_mut() = Some(set);
        Descriptor::from(text)
    });
    mount(&mut root, echo.element()).unwrap();
    let set = setter.borrow().clone().unwrap();
    set.update(|text| format!("{text}b"));
    set.update(|text| format!("{text}c"));
    let updates = sink.take();
    assert_eq!(updates.len(), 2);
    render_and_commit(&mut root, &updates).unwrap();
    assert_eq!(html(&root), "abc");
}

#[test]
#[should_panic(expected = "hooks must run in the same order")]
fn changing_hook_order_panics() {
    let mut root = crate::test_support::new_root();
    let flipped = Rc::new(Cell::new(false));
    let read = flipped.clone();
    let unstable = FunctionComponent::new("Unstable", move |hooks, _| {
        if read.get() {
            hooks.use_ref(|| 0_u8);
        } else {
            hooks.use_state(|| 0_u8);
        }
        Descriptor::Empty
    });
    mount(&mut root, unstable.element()).unwrap();
    flipped.set(true);
    let _ = mount(&mut root, unstable.element());
}

#[test]
fn deps_compare_by_identity_and_length() {
    assert!(deps_equal(&[Value::Int(1)], &[Value::Int(1)]));
    assert!(!deps_equal(&[Value::Int(1)], &[Value::Int(2)]));
    assert!(!deps_equal(&[Value::Int(1)], &[Value::Int(1), Value::Int(2)]));
    assert!(!deps_equal(&[Value::shared(1)], &[Value::shared(1)]));
}
