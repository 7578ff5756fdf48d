pub mod error;
pub mod types;
pub mod value;

pub use error::{ConstraintKind, OrmError, Result};
pub use types::{FieldType, Row, SqlValue};
pub use value::Value;
