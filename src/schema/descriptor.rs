use crate::core::{FieldType, Value};

/// Produces a default value for a field at create or update time.
pub type DefaultFn = fn() -> Value;

/// Field-level validator. Returns a human readable reason on failure.
pub type ValidatorFn = fn(&Value) -> std::result::Result<(), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Text,
    Int,
}

impl IdKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Text => FieldType::Text,
            Self::Int => FieldType::Int,
        }
    }
}

/// How a new row gets its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Random UUID v4 text generated when the caller does not supply one.
    Uuid,
    /// Integer assigned by the store on insert.
    Serial,
    /// The caller must supply the id.
    Caller,
}

#[derive(Debug, Clone, Copy)]
pub struct IdDescriptor {
    pub column: &'static str,
    pub kind: IdKind,
    pub strategy: IdStrategy,
    /// Whether a caller-supplied id is accepted on create.
    pub assignable: bool,
}

impl IdDescriptor {
    pub const fn uuid() -> Self {
        Self {
            column: "id",
            kind: IdKind::Text,
            strategy: IdStrategy::Uuid,
            assignable: false,
        }
    }

    pub const fn serial() -> Self {
        Self {
            column: "id",
            kind: IdKind::Int,
            strategy: IdStrategy::Serial,
            assignable: false,
        }
    }

    pub const fn caller(kind: IdKind) -> Self {
        Self {
            column: "id",
            kind,
            strategy: IdStrategy::Caller,
            assignable: true,
        }
    }

    pub const fn assignable(mut self) -> Self {
        self.assignable = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub ty: FieldType,
    /// Not required on create and may be cleared to NULL.
    pub optional: bool,
    /// Cannot be changed once the row exists.
    pub immutable: bool,
    pub unique: bool,
    pub default: Option<DefaultFn>,
    pub update_default: Option<DefaultFn>,
    pub validator: Option<ValidatorFn>,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            column: name,
            ty,
            optional: false,
            immutable: false,
            unique: false,
            default: None,
            update_default: None,
            validator: None,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default(mut self, f: DefaultFn) -> Self {
        self.default = Some(f);
        self
    }

    pub const fn update_default(mut self, f: DefaultFn) -> Self {
        self.update_default = Some(f);
        self
    }

    pub const fn validate(mut self, f: ValidatorFn) -> Self {
        self.validator = Some(f);
        self
    }

    /// A field that must be present once defaults have been applied.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The foreign key column lives on this entity's table.
    ManyToOne,
    /// The foreign key column lives on the target entity's table.
    OneToMany,
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Restrict,
    SetNull,
    Cascade,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeDescriptor {
    pub name: &'static str,
    pub relation: Relation,
    pub target_entity: &'static str,
    pub target_table: &'static str,
    pub target_id: IdKind,
    /// Column the foreign key references on the "one" side.
    pub target_key: &'static str,
    /// Foreign key column. On this table for many-to-one, on the target table
    /// for one-to-many.
    pub column: &'static str,
    pub required: bool,
    pub on_delete: OnDelete,
}

impl EdgeDescriptor {
    pub const fn many_to_one(
        name: &'static str,
        target_entity: &'static str,
        target_table: &'static str,
        column: &'static str,
    ) -> Self {
        Self {
            name,
            relation: Relation::ManyToOne,
            target_entity,
            target_table,
            target_id: IdKind::Text,
            target_key: "id",
            column,
            required: false,
            on_delete: OnDelete::Restrict,
        }
    }

    pub const fn one_to_many(
        name: &'static str,
        target_entity: &'static str,
        target_table: &'static str,
        column: &'static str,
    ) -> Self {
        Self {
            name,
            relation: Relation::OneToMany,
            target_entity,
            target_table,
            target_id: IdKind::Text,
            target_key: "id",
            column,
            required: false,
            on_delete: OnDelete::Restrict,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn target_id(mut self, kind: IdKind) -> Self {
        self.target_id = kind;
        self
    }

    pub const fn on_delete(mut self, rule: OnDelete) -> Self {
        self.on_delete = rule;
        self
    }

    /// Many-to-one edges hold at most one id.
    pub fn is_unique(&self) -> bool {
        self.relation == Relation::ManyToOne
    }
}

/// Static description of one entity type and its table.
#[derive(Debug)]
pub struct EntitySchema {
    pub name: &'static str,
    pub table: &'static str,
    pub id: IdDescriptor,
    pub fields: &'static [FieldDescriptor],
    pub edges: &'static [EdgeDescriptor],
    /// Composite unique column sets.
    pub unique_together: &'static [&'static [&'static str]],
    /// Name of the nullable timestamp field used for soft delete.
    pub soft_delete: Option<&'static str>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn edge(&self, name: &str) -> Option<&'static EdgeDescriptor> {
        self.edges.iter().find(|e| e.name == name)
    }

    pub fn many_to_one_edges(&self) -> impl Iterator<Item = &'static EdgeDescriptor> {
        self.edges
            .iter()
            .filter(|e| e.relation == Relation::ManyToOne)
    }

    /// Every column stored on this entity's table, id first.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(1 + self.fields.len() + self.edges.len());
        columns.push(self.id.column);
        columns.extend(self.fields.iter().map(|f| f.column));
        columns.extend(self.many_to_one_edges().map(|e| e.column));
        columns
    }

    /// Storage type of a column on this entity's table.
    pub fn column_type(&self, column: &str) -> Option<FieldType> {
        if column == self.id.column {
            return Some(self.id.kind.field_type());
        }
        if let Some(field) = self.field_by_column(column) {
            return Some(field.ty);
        }
        self.many_to_one_edges()
            .find(|e| e.column == column)
            .map(|e| e.target_id.field_type())
    }

    /// Maps a field or many-to-one edge name to its column.
    pub fn resolve_column(&self, name: &str) -> Option<(&'static str, FieldType)> {
        if name == "id" || name == self.id.column {
            return Some((self.id.column, self.id.kind.field_type()));
        }
        if let Some(field) = self.field(name) {
            return Some((field.column, field.ty));
        }
        self.edge(name)
            .filter(|e| e.relation == Relation::ManyToOne)
            .map(|e| (e.column, e.target_id.field_type()))
    }

    /// Checks every edge against the schema of the table it points at: the
    /// id kind must match and the key columns must exist. Targets missing
    /// from `catalog` are not checked.
    pub fn check_edges(&self, catalog: &[&EntitySchema]) -> std::result::Result<(), String> {
        for edge in self.edges {
            let Some(target) = catalog.iter().find(|s| s.table == edge.target_table) else {
                continue;
            };
            if edge.target_id != target.id.kind {
                return Err(format!(
                    "edge {}.{} expects {} ids but {} uses {}",
                    self.name,
                    edge.name,
                    edge.target_id.field_type(),
                    target.name,
                    target.id.kind.field_type()
                ));
            }
            let (keyed, key) = match edge.relation {
                Relation::ManyToOne => (target, edge.target_key),
                Relation::OneToMany => (target, edge.column),
            };
            if keyed.column_type(key).is_none() {
                return Err(format!(
                    "edge {}.{} refers to missing column {}.{}",
                    self.name, edge.name, keyed.table, key
                ));
            }
        }
        Ok(())
    }

    /// Columns whose values must be unique on their own.
    pub fn unique_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.id.column];
        columns.extend(self.fields.iter().filter(|f| f.unique).map(|f| f.column));
        columns
    }
}
