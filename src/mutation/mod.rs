// ============================================================================
// Mutation State
// ============================================================================
//
// Per-operation accumulator of field assignments, field clears, edge deltas
// and row predicates. One instance backs exactly one Create/Update/Delete
// call and is retired once executed.
//
// ============================================================================

use crate::core::{OrmError, Result, Value};
use crate::predicate::Predicate;
use crate::schema::{EdgeDescriptor, EntitySchema, FieldDescriptor};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    UpdateOne,
    Delete,
    DeleteOne,
}

impl Op {
    pub fn is_create(&self) -> bool {
        matches!(self, Op::Create)
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Op::Update | Op::UpdateOne)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete | Op::DeleteOne)
    }

    /// Operations addressed at a single row by id.
    pub fn is_single(&self) -> bool {
        matches!(self, Op::UpdateOne | Op::DeleteOne)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Create => write!(f, "create"),
            Op::Update => write!(f, "update"),
            Op::UpdateOne => write!(f, "update_one"),
            Op::Delete => write!(f, "delete"),
            Op::DeleteOne => write!(f, "delete_one"),
        }
    }
}

/// What a mutation does to one field. Fields absent from the mutation are
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Set(Value),
    Clear,
}

/// Accumulated delta for one edge. `cleared` with `added` means replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeChange {
    pub cleared: bool,
    pub added: Vec<Value>,
    pub removed: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct MutationState {
    schema: &'static EntitySchema,
    op: Op,
    id: Option<Value>,
    fields: BTreeMap<&'static str, FieldChange>,
    edges: BTreeMap<&'static str, EdgeChange>,
    predicates: Vec<Predicate>,
    done: bool,
}

impl MutationState {
    pub fn new(schema: &'static EntitySchema, op: Op) -> Self {
        Self {
            schema,
            op,
            id: None,
            fields: BTreeMap::new(),
            edges: BTreeMap::new(),
            predicates: Vec::new(),
            done: false,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Sets the row identifier: the caller-supplied id on create, the target
    /// row on update-one / delete-one.
    pub fn set_id(&mut self, id: impl Into<Value>) -> Result<()> {
        self.guard()?;
        if self.op.is_create() && !self.schema.id.assignable {
            return Err(OrmError::validation(
                self.schema.name,
                self.schema.id.column,
                "id is generated and cannot be assigned",
            ));
        }
        let id = id.into();
        let kind = self.schema.id.kind.field_type();
        if id.is_null() || !kind.is_compatible(&id) {
            return Err(OrmError::validation(
                self.schema.name,
                self.schema.id.column,
                format!("id expects {}, got {}", kind, id.type_name()),
            ));
        }
        self.id = Some(id);
        Ok(())
    }

    pub(crate) fn assign_generated_id(&mut self, id: Value) {
        self.id = Some(id);
    }

    /// Marks a field dirty with a new value. Setting NULL on an optional
    /// field is the same as clearing it.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.guard()?;
        let field = self.writable_field(name)?;
        let value = value.into();

        if value.is_null() {
            return self.clear_field(name);
        }

        if !field.ty.is_compatible(&value) {
            return Err(OrmError::validation(
                self.schema.name,
                field.name,
                format!("expects {}, got {} ({})", field.ty, value.type_name(), value),
            ));
        }

        self.fields.insert(field.name, FieldChange::Set(value));
        Ok(())
    }

    /// Marks an optional field for NULL. Last call wins against `set_field`.
    pub fn clear_field(&mut self, name: &str) -> Result<()> {
        self.guard()?;
        let field = self.writable_field(name)?;
        if !field.optional {
            return Err(OrmError::validation(
                self.schema.name,
                field.name,
                "field is required and cannot be cleared",
            ));
        }
        self.fields.insert(field.name, FieldChange::Clear);
        Ok(())
    }

    pub fn add_edge<I, V>(&mut self, name: &str, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.guard()?;
        let edge = self.edge_descriptor(name)?;
        let ids = self.edge_ids(edge, ids)?;
        let change = self.edges.entry(edge.name).or_default();
        for id in ids {
            change.removed.retain(|r| r != &id);
            if !change.added.contains(&id) {
                change.added.push(id);
            }
        }
        Ok(())
    }

    pub fn remove_edge<I, V>(&mut self, name: &str, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.guard()?;
        let edge = self.edge_descriptor(name)?;
        if edge.is_unique() {
            return Err(OrmError::invariant(
                self.schema.name,
                edge.name,
                "ids cannot be removed from a unique edge, clear it instead",
            ));
        }
        let ids = self.edge_ids(edge, ids)?;
        let change = self.edges.entry(edge.name).or_default();
        for id in ids {
            change.added.retain(|a| a != &id);
            if !change.removed.contains(&id) {
                change.removed.push(id);
            }
        }
        Ok(())
    }

    /// Clears the edge and drops any delta accumulated for it so far. Ids
    /// added afterwards replace the old set.
    pub fn clear_edge(&mut self, name: &str) -> Result<()> {
        self.guard()?;
        let edge = self.edge_descriptor(name)?;
        let change = self.edges.entry(edge.name).or_default();
        change.cleared = true;
        change.added.clear();
        change.removed.clear();
        Ok(())
    }

    pub fn add_predicate(&mut self, predicate: Predicate) -> Result<()> {
        self.guard()?;
        if self.op.is_create() {
            return Err(OrmError::validation(
                self.schema.name,
                "where",
                "predicates do not apply to create",
            ));
        }
        self.predicates.push(predicate);
        Ok(())
    }

    /// Value a field is set to in this mutation.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(FieldChange::Set(v)) => Some(v),
            _ => None,
        }
    }

    pub fn field_cleared(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(FieldChange::Clear))
    }

    /// Whether the field is part of the mutation at all.
    pub fn field_touched(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldChange)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn edge(&self, name: &str) -> Option<&EdgeChange> {
        self.edges.get(name)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&'static str, &EdgeChange)> {
        self.edges.iter().map(|(k, v)| (*k, v))
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Retires the mutation. Any later setter or a second execution fails
    /// with `AlreadyExecuted`.
    pub fn finish(&mut self) -> Result<()> {
        self.guard()?;
        self.done = true;
        Ok(())
    }

    fn guard(&self) -> Result<()> {
        if self.done {
            return Err(OrmError::AlreadyExecuted);
        }
        Ok(())
    }

    fn writable_field(&self, name: &str) -> Result<&'static FieldDescriptor> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| OrmError::UnknownField(name.to_string()))?;
        if self.op.is_delete() {
            return Err(OrmError::validation(
                self.schema.name,
                field.name,
                "fields cannot be set on delete",
            ));
        }
        if self.op.is_update() && field.immutable {
            return Err(OrmError::validation(
                self.schema.name,
                field.name,
                "field is immutable",
            ));
        }
        Ok(field)
    }

    fn edge_descriptor(&self, name: &str) -> Result<&'static EdgeDescriptor> {
        if self.op.is_delete() {
            return Err(OrmError::validation(
                self.schema.name,
                name,
                "edges cannot be changed on delete",
            ));
        }
        self.schema
            .edge(name)
            .ok_or_else(|| OrmError::UnknownField(name.to_string()))
    }

    fn edge_ids<I, V>(&self, edge: &EdgeDescriptor, ids: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let kind = edge.target_id.field_type();
        ids.into_iter()
            .map(Into::into)
            .map(|id: Value| {
                if id.is_null() || !kind.is_compatible(&id) {
                    Err(OrmError::validation(
                        self.schema.name,
                        edge.name,
                        format!("edge ids must be {}, got {}", kind, id.type_name()),
                    ))
                } else {
                    Ok(id)
                }
            })
            .collect()
    }
}
