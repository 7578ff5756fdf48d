use std::fmt;
use thiserror::Error;

/// Which storage constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::ForeignKey => write!(f, "foreign key"),
            Self::NotNull => write!(f, "not null"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("Validation failed for {entity}.{field}: {message}")]
    Validation {
        entity: String,
        field: String,
        message: String,
    },

    #[error("Invariant violated on {entity}.{edge}: {message}")]
    InvariantViolation {
        entity: String,
        edge: String,
        message: String,
    },

    #[error("Constraint violation ({kind}): {message}")]
    ConstraintViolation { kind: ConstraintKind, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("{entity} query returned {count} rows, expected exactly one")]
    NotSingular { entity: String, count: usize },

    #[error("Unsupported by {backend}: {operation}")]
    Capability { backend: String, operation: String },

    #[error("Type mismatch on column '{column}': {message}")]
    TypeMismatch { column: String, message: String },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Mutation already executed")]
    AlreadyExecuted,

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    pub(crate) fn validation(
        entity: &str,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            entity: entity.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invariant(entity: &str, edge: &str, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            entity: entity.to_string(),
            edge: edge.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn type_mismatch(column: &str, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }

    /// Name of the field a validation error was raised for.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            Self::InvariantViolation { edge, .. } => Some(edge),
            Self::TypeMismatch { column, .. } => Some(column),
            Self::UnknownField(name) => Some(name),
            _ => None,
        }
    }
}
