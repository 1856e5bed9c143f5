mod document;
mod markup;

pub use document::{ControlState, Document, DomError, Namespace, NodeId, Rect};
pub use markup::{parse_fragment, MarkupError};
