use std::cell::RefCell;
use std::rc::Rc;

use crate::context::VALUE_PROP;
use crate::descriptor::{Descriptor, ElementKind, FunctionComponent, Props};
use crate::error::RenderError;
use crate::hooks::{Hooks, RenderedHooks};
use crate::host::Host;
use crate::reconciler::ChildReconciler;
use crate::value::Value;
use crate::work_loop::FiberRoot;
use crate::work_node::{
    create_work_in_progress, EffectFlags, MemoizedState, NodeId, StateNode, WorkTag,
};

impl<H: Host> FiberRoot<H> {
    /// Renders one node and returns the first child to descend into.
    pub(crate) fn begin_work(&mut self, unit: NodeId) -> Result<Option<NodeId>, RenderError> {
        let (tag, current, had_update, props) = {
            let node = self.arena.get(unit)?;
            (
                node.tag,
                node.alternate,
                node.has_pending_update,
                node.pending_props.clone(),
            )
        };
        log::trace!("begin {unit} {tag:?}");

        if let Some(current) = current {
            let unchanged = self
                .arena
                .get(current)?
                .memoized_props
                .as_ref()
                .is_some_and(|previous| Rc::ptr_eq(previous, &props));
            if unchanged && !had_update && !self.context.has_changed_provider() {
                return self.bailout(unit, tag, &props);
            }
        }
        self.arena.get_mut(unit)?.has_pending_update = false;

        match tag {
            WorkTag::Root => self.update_host_root(current, unit),
            WorkTag::HostElement => self.update_host_component(current, unit, &props),
            WorkTag::HostText => Ok(None),
            WorkTag::Fragment => self.reconcile_children(current, unit, props.children()),
            WorkTag::FunctionComponent => {
                let component = match self.element_type(unit)? {
                    ElementKind::Function(component) => component,
                    _ => return Err(RenderError::UnknownKind { id: unit, tag }),
                };
                let children = self.render_with_hooks(current, unit, &component, &props)?;
                self.reconcile_children(current, unit, &children)
            }
            WorkTag::Memoized => self.update_memo_component(current, unit, had_update, &props),
            WorkTag::ClassComponent => self.update_class_component(current, unit, &props),
            WorkTag::ContextProvider => self.update_context_provider(current, unit, &props),
            WorkTag::ContextConsumer => {
                let consumer = match self.element_type(unit)? {
                    ElementKind::Consumer(consumer) => consumer,
                    _ => return Err(RenderError::UnknownKind { id: unit, tag }),
                };
                let value = self.context.read(&consumer.context);
                let children = (consumer.render)(&value);
                self.reconcile_children(current, unit, &children)
            }
        }
    }

    fn element_type(&self, unit: NodeId) -> Result<ElementKind, RenderError> {
        let node = self.arena.get(unit)?;
        node.element_type.clone().ok_or(RenderError::UnknownKind {
            id: unit,
            tag: node.tag,
        })
    }

    /// Skips rendering `unit`; its children are cloned from the current tree.
    fn bailout(
        &mut self,
        unit: NodeId,
        tag: WorkTag,
        props: &Props,
    ) -> Result<Option<NodeId>, RenderError> {
        log::trace!("bailout {unit}");
        if tag == WorkTag::ContextProvider {
            let context = match self.element_type(unit)? {
                ElementKind::Provider(context) => context,
                _ => return Err(RenderError::UnknownKind { id: unit, tag }),
            };
            let value = props.get(VALUE_PROP).cloned().unwrap_or_default();
            self.context.push(context.id(), value, false);
        }
        self.clone_child_fibers(unit)?;
        Ok(self.arena.get(unit)?.child)
    }

    fn clone_child_fibers(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let Some(mut current_child) = self.arena.get(unit)?.child else {
            return Ok(());
        };
        let props = self.arena.get(current_child)?.pending_props.clone();
        let mut new_child = create_work_in_progress(&mut self.arena, current_child, props)?;
        self.arena.get_mut(unit)?.child = Some(new_child);
        self.arena.get_mut(new_child)?.parent = Some(unit);
        while let Some(next) = self.arena.get(current_child)?.sibling {
            current_child = next;
            let props = self.arena.get(current_child)?.pending_props.clone();
            let clone = create_work_in_progress(&mut self.arena, current_child, props)?;
            self.arena.get_mut(new_child)?.sibling = Some(clone);
            self.arena.get_mut(clone)?.parent = Some(unit);
            new_child = clone;
        }
        self.arena.get_mut(new_child)?.sibling = None;
        Ok(())
    }

    pub(crate) fn reconcile_children(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        children: &Descriptor,
    ) -> Result<Option<NodeId>, RenderError> {
        let current_first = match current {
            Some(current) => self.arena.get(current)?.child,
            None => None,
        };
        let first = ChildReconciler::new(&mut self.arena, current.is_some(), &mut self.created)
            .reconcile(unit, current_first, children)?;
        self.arena.get_mut(unit)?.child = first;
        Ok(first)
    }

    fn update_host_root(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
    ) -> Result<Option<NodeId>, RenderError> {
        let element = match &self.arena.get(unit)?.memoized_state {
            MemoizedState::Root(element) => element.clone(),
            _ => Rc::new(Descriptor::Empty),
        };
        self.reconcile_children(current, unit, &element)
    }

    fn update_host_component(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        props: &Props,
    ) -> Result<Option<NodeId>, RenderError> {
        // Direct text is written as text content in the complete phase.
        if props.text().is_some() {
            self.reconcile_children(current, unit, &Descriptor::Empty)?;
            return Ok(None);
        }
        self.reconcile_children(current, unit, props.children())
    }

    fn render_with_hooks(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        component: &FunctionComponent,
        props: &Props,
    ) -> Result<Descriptor, RenderError> {
        let previous = match current {
            Some(current) => self
                .arena
                .get(current)?
                .memoized_state
                .hooks()
                .map(<[_]>::to_vec),
            None => None,
        };
        let mut hooks = Hooks::new(previous.as_deref(), unit, &self.sink, &self.context);
        let children = component.call(&mut hooks, props);
        let RenderedHooks {
            hooks,
            effects,
            flags,
        } = hooks.finish();
        let node = self.arena.get_mut(unit)?;
        node.memoized_state = MemoizedState::Hooks(hooks);
        node.effects = effects;
        node.flags |= flags;
        Ok(children)
    }

    fn update_memo_component(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        had_update: bool,
        props: &Props,
    ) -> Result<Option<NodeId>, RenderError> {
        let memo = match self.element_type(unit)? {
            ElementKind::Memo(memo) => memo,
            _ => {
                return Err(RenderError::UnknownKind {
                    id: unit,
                    tag: WorkTag::Memoized,
                })
            }
        };
        if let Some(current) = current {
            let previous = self.arena.get(current)?.memoized_props.clone();
            if let Some(previous) = previous {
                if !had_update
                    && !self.context.has_changed_provider()
                    && memo.props_equal(&previous, props)
                {
                    return self.bailout(unit, WorkTag::Memoized, props);
                }
            }
        }
        let children = self.render_with_hooks(current, unit, &memo.inner, props)?;
        self.reconcile_children(current, unit, &children)
    }

    fn update_class_component(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        props: &Props,
    ) -> Result<Option<NodeId>, RenderError> {
        let class = match self.element_type(unit)? {
            ElementKind::Class(class) => class,
            _ => {
                return Err(RenderError::UnknownKind {
                    id: unit,
                    tag: WorkTag::ClassComponent,
                })
            }
        };
        let existing = match &self.arena.get(unit)?.state_node {
            StateNode::Instance(instance) if current.is_some() => Some(instance.clone()),
            _ => None,
        };
        let instance = match existing {
            Some(instance) => {
                let previous = match current {
                    Some(current) => self.arena.get(current)?.memoized_props.clone(),
                    None => None,
                };
                if previous.as_deref() != Some(props) {
                    self.arena.get_mut(unit)?.flags |= EffectFlags::UPDATE;
                }
                instance
            }
            None => {
                let instance = Rc::new(RefCell::new(class.construct(props)));
                let node = self.arena.get_mut(unit)?;
                node.state_node = StateNode::Instance(instance.clone());
                node.flags |= EffectFlags::UPDATE;
                instance
            }
        };
        let context = class
            .context_type
            .as_ref()
            .map(|context| self.context.read(context));
        let children = instance.borrow_mut().render(props, context.as_ref());
        self.reconcile_children(current, unit, &children)
    }

    fn update_context_provider(
        &mut self,
        current: Option<NodeId>,
        unit: NodeId,
        props: &Props,
    ) -> Result<Option<NodeId>, RenderError> {
        let context = match self.element_type(unit)? {
            ElementKind::Provider(context) => context,
            _ => {
                return Err(RenderError::UnknownKind {
                    id: unit,
                    tag: WorkTag::ContextProvider,
                })
            }
        };
        let value = props.get(VALUE_PROP).cloned().unwrap_or(Value::Null);
        let changed = match current {
            Some(current) => self
                .arena
                .get(current)?
                .memoized_props
                .as_ref()
                .and_then(|previous| previous.get(VALUE_PROP))
                .map_or(true, |previous| !previous.is(&value)),
            None => false,
        };
        self.context.push(context.id(), value, changed);
        self.reconcile_children(current, unit, props.children())
    }
}
