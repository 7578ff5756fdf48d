use super::conflict::{ConflictPolicy, ConflictTarget, Merge, OnConflict};
use super::filter::{Filter, compile_filter};
use super::{
    Assignment, ColumnResolution, ConflictAction, ConflictSpec, CreateSpec, DeleteSpec, EdgeSpec,
    IdSpec, Resolution, UpdateSpec,
};
use crate::codec;
use crate::core::{OrmError, Result, SqlValue, Value};
use crate::mutation::{MutationState, Op};
use crate::schema::{EdgeDescriptor, EntitySchema, IdStrategy, Relation};
use uuid::Uuid;

/// Fills untouched fields from their generators: `default` on create,
/// `update_default` on update. Generates the id of a UUID entity when the
/// caller did not supply one.
pub fn apply_defaults(state: &mut MutationState) -> Result<()> {
    let schema = state.schema();
    match state.op() {
        Op::Create => {
            for field in schema.fields {
                if let Some(default) = field.default
                    && !state.field_touched(field.name)
                {
                    state.set_field(field.name, default())?;
                }
            }
            if schema.id.strategy == IdStrategy::Uuid && state.id().is_none() {
                state.assign_generated_id(Value::Text(Uuid::new_v4().to_string()));
            }
        }
        Op::Update | Op::UpdateOne => {
            for field in schema.fields {
                if let Some(default) = field.update_default
                    && !state.field_touched(field.name)
                {
                    state.set_field(field.name, default())?;
                }
            }
        }
        Op::Delete | Op::DeleteOne => {}
    }
    Ok(())
}

/// Validates the accumulated mutation. Runs after `apply_defaults` and
/// before any statement is built.
pub fn check(state: &MutationState) -> Result<()> {
    let schema = state.schema();
    let op = state.op();

    if op.is_create() && schema.id.strategy == IdStrategy::Caller && state.id().is_none() {
        return Err(OrmError::validation(
            schema.name,
            schema.id.column,
            "id must be supplied",
        ));
    }
    if op.is_single() && state.id().is_none() {
        return Err(OrmError::validation(
            schema.name,
            schema.id.column,
            format!("{} needs the id of the target row", op),
        ));
    }

    for field in schema.fields {
        match state.field(field.name) {
            Some(value) => {
                if !field.ty.is_compatible(value) {
                    return Err(OrmError::validation(
                        schema.name,
                        field.name,
                        format!("expects {}, got {}", field.ty, value.type_name()),
                    ));
                }
                if let Some(validator) = field.validator {
                    validator(value)
                        .map_err(|cause| OrmError::validation(schema.name, field.name, cause))?;
                }
            }
            None if op.is_create() && !field.optional => {
                return Err(OrmError::validation(
                    schema.name,
                    field.name,
                    "missing required field",
                ));
            }
            None => {}
        }
    }

    for edge in schema.edges {
        let change = state.edge(edge.name);
        if let Some(change) = change {
            if edge.is_unique() && change.added.len() > 1 {
                return Err(OrmError::invariant(
                    schema.name,
                    edge.name,
                    format!("unique edge given {} ids", change.added.len()),
                ));
            }
            if op == Op::Update && edge.relation == Relation::OneToMany && !change.added.is_empty()
            {
                return Err(OrmError::invariant(
                    schema.name,
                    edge.name,
                    "children can only be attached through a single-row update",
                ));
            }
            if edge.required && change.cleared {
                if !change.added.is_empty() {
                    return Err(OrmError::invariant(
                        schema.name,
                        edge.name,
                        "required edge cleared while a new id is set",
                    ));
                }
                return Err(OrmError::validation(
                    schema.name,
                    edge.name,
                    "required edge cannot be cleared",
                ));
            }
        }
        if op.is_create()
            && edge.required
            && edge.relation == Relation::ManyToOne
            && change.is_none_or(|c| c.added.is_empty())
        {
            return Err(OrmError::validation(
                schema.name,
                edge.name,
                "missing required edge",
            ));
        }
    }

    Ok(())
}

pub fn build_create(state: &MutationState, on_conflict: Option<&OnConflict>) -> Result<CreateSpec> {
    let schema = state.schema();
    let id = match state.id() {
        Some(id) => IdSpec::Value(encode_id(schema, id)?),
        None if schema.id.strategy == IdStrategy::Serial => IdSpec::Serial,
        None => {
            return Err(OrmError::validation(
                schema.name,
                schema.id.column,
                "id must be supplied",
            ));
        }
    };

    let mut spec = CreateSpec {
        entity: schema.name,
        table: schema.table,
        id_column: schema.id.column,
        id,
        assignments: assignments(state)?,
        edges: edge_specs(state)?,
        on_conflict: None,
    };

    if let Some(on_conflict) = on_conflict {
        spec.on_conflict = Some(conflict_spec(schema, &spec, on_conflict)?);
    }

    Ok(spec)
}

pub fn build_update(state: &MutationState) -> Result<UpdateSpec> {
    let schema = state.schema();
    let cleared = schema
        .fields
        .iter()
        .filter(|f| state.field_cleared(f.name))
        .map(|f| f.column)
        .collect();

    Ok(UpdateSpec {
        entity: schema.name,
        table: schema.table,
        id_column: schema.id.column,
        filter: row_filter(state)?,
        target_id: match state.id() {
            Some(id) if state.op().is_single() => Some(encode_id(schema, id)?),
            _ => None,
        },
        assignments: assignments(state)?,
        cleared,
        edges: edge_specs(state)?,
    })
}

pub fn build_delete(state: &MutationState) -> Result<DeleteSpec> {
    let schema = state.schema();
    Ok(DeleteSpec {
        entity: schema.name,
        table: schema.table,
        id_column: schema.id.column,
        filter: row_filter(state)?,
    })
}

fn encode_id(schema: &EntitySchema, id: &Value) -> Result<SqlValue> {
    codec::encode(schema.id.column, schema.id.kind.field_type(), id)
}

fn assignments(state: &MutationState) -> Result<Vec<Assignment>> {
    let schema = state.schema();
    let mut out = Vec::new();
    for field in schema.fields {
        if let Some(value) = state.field(field.name) {
            out.push(Assignment {
                column: field.column,
                ty: field.ty,
                value: codec::encode(field.column, field.ty, value)?,
            });
        }
    }
    Ok(out)
}

fn edge_specs(state: &MutationState) -> Result<Vec<EdgeSpec>> {
    let schema = state.schema();
    let mut out = Vec::new();
    for edge in schema.edges {
        let Some(change) = state.edge(edge.name) else {
            continue;
        };
        out.push(EdgeSpec {
            edge: edge.name,
            relation: edge.relation,
            table: match edge.relation {
                Relation::ManyToOne => schema.table,
                Relation::OneToMany => edge.target_table,
            },
            column: edge.column,
            target_table: edge.target_table,
            target_key: edge.target_key,
            clear: change.cleared,
            add: encode_edge_ids(edge, &change.added)?,
            remove: encode_edge_ids(edge, &change.removed)?,
        });
    }
    Ok(out)
}

fn encode_edge_ids(edge: &EdgeDescriptor, ids: &[Value]) -> Result<Vec<SqlValue>> {
    let ty = edge.target_id.field_type();
    ids.iter()
        .map(|id| codec::encode(edge.name, ty, id))
        .collect()
}

/// Id match for single-row operations, conjoined with the caller's
/// predicates.
fn row_filter(state: &MutationState) -> Result<Option<Filter>> {
    let schema = state.schema();
    let mut filters = Vec::new();
    if state.op().is_single() {
        let id = state
            .id()
            .ok_or_else(|| OrmError::validation(schema.name, schema.id.column, "missing id"))?;
        filters.push(Filter::Eq(schema.id.column, encode_id(schema, id)?));
    }
    for predicate in state.predicates() {
        filters.push(compile_filter(schema, predicate)?);
    }
    Ok(Filter::all(filters))
}

fn resolve_name(schema: &EntitySchema, name: &str) -> Result<&'static str> {
    schema
        .resolve_column(name)
        .map(|(column, _)| column)
        .ok_or_else(|| OrmError::UnknownField(name.to_string()))
}

fn is_immutable_column(schema: &EntitySchema, column: &str) -> bool {
    column == schema.id.column || schema.field_by_column(column).is_some_and(|f| f.immutable)
}

fn conflict_spec(
    schema: &EntitySchema,
    create: &CreateSpec,
    on_conflict: &OnConflict,
) -> Result<ConflictSpec> {
    let target = match &on_conflict.target {
        ConflictTarget::PrimaryKey => vec![schema.id.column],
        ConflictTarget::Columns(names) => {
            if names.is_empty() {
                return Err(OrmError::validation(
                    schema.name,
                    "on_conflict",
                    "conflict target needs at least one column",
                ));
            }
            names
                .iter()
                .map(|n| resolve_name(schema, n))
                .collect::<Result<Vec<_>>>()?
        }
    };

    let action = match &on_conflict.policy {
        ConflictPolicy::DoNothing => ConflictAction::DoNothing,
        ConflictPolicy::Ignore => ConflictAction::Update(Vec::new()),
        ConflictPolicy::UpdateNewValues { ignore } => {
            let ignored = ignore
                .iter()
                .map(|n| resolve_name(schema, n))
                .collect::<Result<Vec<_>>>()?;
            let columns = create
                .row_values()
                .into_iter()
                .map(|(column, _)| column)
                .filter(|c| !target.contains(c))
                .filter(|c| !ignored.contains(c))
                .filter(|c| !is_immutable_column(schema, c))
                .map(|column| ColumnResolution {
                    column,
                    resolution: Resolution::New,
                })
                .collect();
            ConflictAction::Update(columns)
        }
        ConflictPolicy::Custom(rules) => {
            let mut columns = Vec::with_capacity(rules.len());
            for (name, merge) in rules {
                let (column, ty) = schema
                    .resolve_column(name)
                    .ok_or_else(|| OrmError::UnknownField(name.clone()))?;
                if is_immutable_column(schema, column) {
                    return Err(OrmError::validation(
                        schema.name,
                        name,
                        "immutable column cannot be resolved on conflict",
                    ));
                }
                let resolution = match merge {
                    Merge::New => Resolution::New,
                    Merge::Existing => Resolution::Existing,
                    Merge::Value(value) => Resolution::Value(codec::encode(column, ty, value)?),
                };
                columns.push(ColumnResolution { column, resolution });
            }
            ConflictAction::Update(columns)
        }
    };

    Ok(ConflictSpec { target, action })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldType;
    use crate::predicate;
    use crate::schema::{EdgeDescriptor, FieldDescriptor, IdDescriptor, validators};

    static ACCOUNT: EntitySchema = EntitySchema {
        name: "Account",
        table: "accounts",
        id: IdDescriptor::uuid(),
        fields: &[
            FieldDescriptor::new("namespace", FieldType::Text)
                .immutable()
                .validate(validators::namespace),
            FieldDescriptor::new("name", FieldType::Text),
            FieldDescriptor::new("note", FieldType::Text).optional(),
            FieldDescriptor::new("created_at", FieldType::Time)
                .default(validators::now)
                .immutable(),
            FieldDescriptor::new("updated_at", FieldType::Time)
                .default(validators::now)
                .update_default(validators::now),
        ],
        edges: &[
            EdgeDescriptor::many_to_one("owner", "Owner", "owners", "owner_id").required(),
            EdgeDescriptor::one_to_many("users", "User", "users", "account_id"),
        ],
        unique_together: &[&["namespace", "name"]],
        soft_delete: None,
    };

    fn valid_create() -> MutationState {
        let mut m = MutationState::new(&ACCOUNT, Op::Create);
        m.set_field("namespace", "acme").unwrap();
        m.set_field("name", "Main").unwrap();
        m.add_edge("owner", ["o1"]).unwrap();
        m
    }

    #[test]
    fn test_defaults_fill_untouched_fields_and_id() {
        let mut m = valid_create();
        apply_defaults(&mut m).unwrap();
        assert!(m.field("created_at").is_some());
        assert!(m.field("updated_at").is_some());
        assert!(matches!(m.id(), Some(Value::Text(_))));
        check(&m).unwrap();
    }

    #[test]
    fn test_update_default_only_on_update() {
        let mut m = MutationState::new(&ACCOUNT, Op::UpdateOne);
        m.set_id("a1").unwrap();
        apply_defaults(&mut m).unwrap();
        assert!(m.field("updated_at").is_some());
        assert!(m.field("created_at").is_none());
    }

    #[test]
    fn test_check_reports_missing_required_field() {
        let mut m = MutationState::new(&ACCOUNT, Op::Create);
        m.set_field("namespace", "acme").unwrap();
        m.add_edge("owner", ["o1"]).unwrap();
        apply_defaults(&mut m).unwrap();
        let err = check(&m).unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_check_runs_validators() {
        let mut m = valid_create();
        m.set_field("namespace", "Not Valid").unwrap();
        apply_defaults(&mut m).unwrap();
        let err = check(&m).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.field(), Some("namespace"));
    }

    #[test]
    fn test_required_edge_rules() {
        let mut missing = MutationState::new(&ACCOUNT, Op::Create);
        missing.set_field("namespace", "acme").unwrap();
        missing.set_field("name", "Main").unwrap();
        apply_defaults(&mut missing).unwrap();
        assert_eq!(check(&missing).unwrap_err().field(), Some("owner"));

        let mut replaced = MutationState::new(&ACCOUNT, Op::UpdateOne);
        replaced.set_id("a1").unwrap();
        replaced.clear_edge("owner").unwrap();
        replaced.add_edge("owner", ["o2"]).unwrap();
        assert!(check(&replaced).unwrap_err().is_invariant_violation());

        let mut cleared = MutationState::new(&ACCOUNT, Op::UpdateOne);
        cleared.set_id("a1").unwrap();
        cleared.clear_edge("owner").unwrap();
        assert!(check(&cleared).unwrap_err().is_validation());

        let mut many = valid_create();
        many.add_edge("owner", ["o2"]).unwrap();
        apply_defaults(&mut many).unwrap();
        let err = check(&many).unwrap_err();
        assert!(err.is_invariant_violation(), "{}", err);
        assert_eq!(err.field(), Some("owner"));
    }

    #[test]
    fn test_build_create_orders_assignments_by_schema() {
        let mut m = valid_create();
        m.set_field("note", "hello").unwrap();
        m.add_edge("users", ["u1", "u2"]).unwrap();
        apply_defaults(&mut m).unwrap();
        check(&m).unwrap();

        let spec = build_create(&m, None).unwrap();
        let columns: Vec<_> = spec.assignments.iter().map(|a| a.column).collect();
        assert_eq!(columns, vec!["namespace", "name", "note", "created_at", "updated_at"]);
        assert!(matches!(spec.id, IdSpec::Value(SqlValue::Text(_))));

        assert_eq!(spec.edges.len(), 2);
        assert_eq!(spec.edges[0].table, "accounts");
        assert_eq!(spec.edges[0].column, "owner_id");
        assert_eq!(spec.edges[1].table, "users");
        assert_eq!(spec.edges[1].add.len(), 2);

        let row = spec.row_values();
        assert_eq!(row.last().map(|(c, _)| *c), Some("owner_id"));
    }

    #[test]
    fn test_multi_row_update_cannot_attach_children() {
        let mut m = MutationState::new(&ACCOUNT, Op::Update);
        m.add_predicate(predicate::eq("namespace", "acme")).unwrap();
        m.add_edge("users", ["u1"]).unwrap();
        let err = check(&m).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(err.field(), Some("users"));

        let mut detach = MutationState::new(&ACCOUNT, Op::Update);
        detach.remove_edge("users", ["u1"]).unwrap();
        check(&detach).unwrap();

        let mut one = MutationState::new(&ACCOUNT, Op::UpdateOne);
        one.set_id("a1").unwrap();
        one.add_edge("users", ["u1"]).unwrap();
        check(&one).unwrap();
    }

    #[test]
    fn test_build_update_one_filter_and_cleared() {
        let mut m = MutationState::new(&ACCOUNT, Op::UpdateOne);
        m.set_id("a1").unwrap();
        m.set_field("name", "Renamed").unwrap();
        m.clear_field("note").unwrap();
        m.add_predicate(predicate::eq("namespace", "acme")).unwrap();

        let spec = build_update(&m).unwrap();
        assert_eq!(spec.cleared, vec!["note"]);
        assert_eq!(spec.target_id, Some(SqlValue::Text("a1".into())));
        assert_eq!(
            spec.filter,
            Some(Filter::And(vec![
                Filter::Eq("id", SqlValue::Text("a1".into())),
                Filter::Eq("namespace", SqlValue::Text("acme".into())),
            ]))
        );
    }

    #[test]
    fn test_update_new_values_skips_key_and_immutable_columns() {
        let mut m = valid_create();
        m.set_field("note", "n").unwrap();
        apply_defaults(&mut m).unwrap();

        let on_conflict = OnConflict {
            target: ConflictTarget::columns(["namespace", "name"]),
            policy: ConflictPolicy::UpdateNewValues {
                ignore: vec!["note".into()],
            },
        };
        let spec = build_create(&m, Some(&on_conflict)).unwrap();
        let conflict = spec.on_conflict.unwrap();
        assert_eq!(conflict.target, vec!["namespace", "name"]);

        let ConflictAction::Update(columns) = conflict.action else {
            panic!("expected update action");
        };
        let columns: Vec<_> = columns.iter().map(|c| c.column).collect();
        assert_eq!(columns, vec!["updated_at", "owner_id"]);
    }

    #[test]
    fn test_custom_resolution_rejects_immutable_column() {
        let m = valid_create();
        let on_conflict = OnConflict {
            target: ConflictTarget::PrimaryKey,
            policy: ConflictPolicy::Custom(vec![("created_at".into(), Merge::New)]),
        };
        let mut m = m;
        apply_defaults(&mut m).unwrap();
        assert!(build_create(&m, Some(&on_conflict)).unwrap_err().is_validation());
    }
}
