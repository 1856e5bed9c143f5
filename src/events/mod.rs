mod binding;
mod delegation;
mod dom_event;
mod drag;

pub use binding::{EventBinding, ListenerKind};
pub use delegation::DelegationEngine;
pub use dom_event::{DispatchOutcome, DomEvent};
pub use drag::{DragState, DragTracker};
