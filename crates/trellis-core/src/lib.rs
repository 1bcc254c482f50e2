//! Incremental tree reconciler with hooks, context and a cooperative
//! priority scheduler.
//!
//! Components return [`Descriptor`] trees. A [`Renderer`] diffs each new
//! tree against the committed one and applies the minimal set of mutations
//! to a [`Host`]. Rendering runs inside [`Scheduler`] tasks and can yield
//! between units of work.

mod begin_work;
pub mod collections;
mod commit;
mod complete_work;
mod context;
mod descriptor;
mod error;
mod hooks;
mod host;
mod inspect;
pub mod platform;
mod reconciler;
mod root;
pub mod scheduler;
mod value;
mod work_loop;
mod work_node;

pub use context::{Context, ContextConsumer, ContextId, ErasedContext};
pub use descriptor::{
    element, ClassComponent, Component, Descriptor, Element, ElementBuilder, ElementKind,
    FunctionComponent, Key, MemoComponent, Props,
};
pub use error::{HostError, RenderError};
pub use hooks::{
    cleanup, Cleanup, Dispatch, EffectTag, Hooks, IntoCleanup, MutableRef, SetState, StateAction,
};
pub use host::{Host, HostId, HostOp, MemoryHost, MemoryNode, MemoryNodeKind};
pub use inspect::NodeSnapshot;
pub use platform::{Clock, HostScheduler, ManualHostScheduler, Millis};
pub use root::{Renderer, RootOptions};
pub use scheduler::{Callback, Priority, Scheduler, SchedulerConfig, TaskHandle};
pub use value::{EventHandler, Value};
pub use work_node::{EffectFlags, NodeId, WorkTag};

pub mod prelude {
    pub use crate::deps;
    pub use crate::{
        cleanup, element, ClassComponent, Component, Context, Descriptor, FunctionComponent,
        Hooks, MemoComponent, Props, Renderer, Value,
    };
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
