mod applier;
pub mod attributes;
mod record;
pub mod values;

pub use applier::PatchApplier;
pub use attributes::{AttrValue, AttributeKind, Attributes, BooleanProperty};
pub use record::{ElementPatch, EventDeclaration, PatchRecord, ScriptPatch, StubPatch, TextPatch};
pub use values::FieldValue;
