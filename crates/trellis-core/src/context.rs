//! Typed contexts and the provider value stack used during rendering.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::collections::map::HashMap;
use crate::descriptor::{Descriptor, ElementBuilder, ElementKind};
use crate::error::RenderError;
use crate::value::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Prop under which a provider element carries its value.
pub(crate) const VALUE_PROP: &str = "value";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// Untyped context identity plus its default value.
#[derive(Clone)]
pub struct ErasedContext {
    id: ContextId,
    default: Value,
}

impl ErasedContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

impl fmt::Debug for ErasedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedContext")
            .field("id", &self.id)
            .finish()
    }
}

/// A value that flows from the nearest enclosing provider to its readers.
pub struct Context<T: 'static> {
    erased: ErasedContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            erased: ErasedContext {
                id: ContextId::next(),
                default: Value::shared(default),
            },
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.erased.id
    }

    pub fn erased(&self) -> &ErasedContext {
        &self.erased
    }

    /// Provider element. Each call wraps the value in a fresh allocation, so
    /// readers see a change on every render unless the element is reused.
    pub fn provider(&self, value: T) -> ElementBuilder {
        self.provide_shared(Rc::new(value))
    }

    /// Provider element sharing an existing allocation.
    pub fn provide_shared(&self, value: Rc<T>) -> ElementBuilder {
        ElementBuilder::new(ElementKind::Provider(self.erased.clone()))
            .prop(VALUE_PROP, Value::Shared(value))
    }

    /// Consumer element rendering from the current value.
    pub fn consumer(&self, render: impl Fn(&T) -> Descriptor + 'static) -> ElementBuilder {
        let render = move |value: &Value| render(&Self::unwrap(value));
        ElementBuilder::new(ElementKind::Consumer(ContextConsumer {
            context: self.erased.clone(),
            render: Rc::new(render),
        }))
    }

    pub(crate) fn unwrap(value: &Value) -> Rc<T> {
        value
            .downcast::<T>()
            .expect("context value type mismatch")
    }
}

impl<T: 'static> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.erased.id).finish()
    }
}

#[derive(Clone)]
pub struct ContextConsumer {
    pub(crate) context: ErasedContext,
    pub(crate) render: Rc<dyn Fn(&Value) -> Descriptor>,
}

struct StackEntry {
    context: ContextId,
    previous: Option<Value>,
    changed: bool,
}

/// Save/restore stack of provider values for the tree being rendered.
#[derive(Default)]
pub(crate) struct ContextStack {
    current: HashMap<ContextId, Value>,
    entries: Vec<StackEntry>,
    changed: usize,
}

impl ContextStack {
    pub(crate) fn push(&mut self, context: ContextId, value: Value, changed: bool) {
        let previous = self.current.insert(context, value);
        if changed {
            self.changed += 1;
        }
        self.entries.push(StackEntry {
            context,
            previous,
            changed,
        });
    }

    pub(crate) fn pop(&mut self, context: ContextId) -> Result<(), RenderError> {
        let Some(entry) = self.entries.pop() else {
            return Err(RenderError::ContextStackMismatch {
                expected: context,
                found: None,
            });
        };
        if entry.context != context {
            let found = Some(entry.context);
            self.entries.push(entry);
            return Err(RenderError::ContextStackMismatch {
                expected: context,
                found,
            });
        }
        match entry.previous {
            Some(previous) => {
                self.current.insert(context, previous);
            }
            None => {
                self.current.remove(&context);
            }
        }
        if entry.changed {
            self.changed -= 1;
        }
        Ok(())
    }

    pub(crate) fn read(&self, context: &ErasedContext) -> Value {
        self.current
            .get(&context.id)
            .cloned()
            .unwrap_or_else(|| context.default.clone())
    }

    /// True while any enclosing provider changed its value in this pass.
    pub(crate) fn has_changed_provider(&self) -> bool {
        self.changed > 0
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn reset(&mut self) {
        self.current.clear();
        self.entries.clear();
        self.changed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_pushes_restore_outer_values() {
        let theme = Context::new(0_i64);
        let mut stack = ContextStack::default();
        assert_eq!(*Context::<i64>::unwrap(&stack.read(theme.erased())), 0);

        stack.push(theme.id(), Value::shared(1_i64), false);
        stack.push(theme.id(), Value::shared(2_i64), true);
        assert_eq!(*Context::<i64>::unwrap(&stack.read(theme.erased())), 2);
        assert!(stack.has_changed_provider());

        stack.pop(theme.id()).unwrap();
        assert_eq!(*Context::<i64>::unwrap(&stack.read(theme.erased())), 1);
        assert!(!stack.has_changed_provider());

        stack.pop(theme.id()).unwrap();
        assert_eq!(*Context::<i64>::unwrap(&stack.read(theme.erased())), 0);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn mismatched_pop_is_reported() {
        let a = Context::new(());
        let b = Context::new(());
        let mut stack = ContextStack::default();
        stack.push(a.id(), Value::Null, false);
        let err = stack.pop(b.id()).unwrap_err();
        assert_eq!(
            err,
            RenderError::ContextStackMismatch {
                expected: b.id(),
                found: Some(a.id()),
            }
        );
        assert_eq!(stack.depth(), 1);
        assert!(matches!(
            ContextStack::default().pop(a.id()),
            Err(RenderError::ContextStackMismatch { found: None, .. })
        ));
    }
}
