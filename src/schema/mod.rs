// ============================================================================
// Schema Descriptors
// ============================================================================
//
// Entities are described once, statically, and every builder, codec and
// driver works off these descriptors instead of per-entity generated code.
//
// ============================================================================

pub mod descriptor;
pub mod validators;

pub use descriptor::{
    DefaultFn, EdgeDescriptor, EntitySchema, FieldDescriptor, IdDescriptor, IdKind, IdStrategy,
    OnDelete, Relation, ValidatorFn,
};
pub use validators::ValueObject;
