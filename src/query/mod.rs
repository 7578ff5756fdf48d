// ============================================================================
// Query Builder
// ============================================================================
//
// Read side of the persistence layer. Predicates are compiled against the
// schema, soft-deleted rows are hidden by default, and every row is decoded
// through the field codec into a `Record`.
//
// ============================================================================

use crate::codec;
use crate::context::Context;
use crate::core::{FieldType, OrmError, Result, SqlValue, Value};
use crate::entity::{Entity, Record};
use crate::executor::Executor;
use crate::predicate::{self, Predicate};
use crate::schema::EntitySchema;
use crate::spec::{AggregateFunc, AggregateSpec, Filter, Order, ProjectionSpec, QuerySpec, compile_filter};

/// Aggregate over the rows a query matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn sum(field: &str) -> Self {
        Aggregate::Sum(field.to_string())
    }

    pub fn min(field: &str) -> Self {
        Aggregate::Min(field.to_string())
    }

    pub fn max(field: &str) -> Self {
        Aggregate::Max(field.to_string())
    }
}

/// Extra value selected next to the static columns, read back with
/// `Record::get(alias)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Field { field: String, alias: String },
    Literal { value: Value, alias: String },
}

impl Projection {
    pub fn field(field: &str, alias: &str) -> Self {
        Projection::Field {
            field: field.to_string(),
            alias: alias.to_string(),
        }
    }

    pub fn literal(value: impl Into<Value>, alias: &str) -> Self {
        Projection::Literal {
            value: value.into(),
            alias: alias.to_string(),
        }
    }
}

pub struct Query<'c> {
    exec: Executor<'c>,
    schema: &'static EntitySchema,
    predicates: Vec<Predicate>,
    order: Vec<(String, Order)>,
    limit: Option<usize>,
    offset: Option<usize>,
    with_deleted: bool,
    projections: Vec<Projection>,
}

impl<'c> Query<'c> {
    pub(crate) fn new(exec: Executor<'c>, schema: &'static EntitySchema) -> Self {
        Self {
            exec,
            schema,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            with_deleted: false,
            projections: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn namespace(self, namespace: &str) -> Self {
        self.filter(predicate::eq("namespace", namespace))
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Include soft-deleted rows.
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    pub fn select_extra(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    fn spec(&self, aggregate: Option<AggregateSpec>) -> Result<QuerySpec> {
        let schema = self.schema;
        let mut filters = Vec::with_capacity(self.predicates.len() + 1);
        for predicate in &self.predicates {
            filters.push(compile_filter(schema, predicate)?);
        }
        if let Some(field) = schema.soft_delete
            && !self.with_deleted
            && self.exec.config().exclude_soft_deleted
        {
            let (column, _) = resolve(schema, field)?;
            filters.push(Filter::IsNull(column));
        }

        let mut order = Vec::with_capacity(self.order.len());
        for (field, direction) in &self.order {
            order.push((resolve(schema, field)?.0, *direction));
        }

        let mut projections = Vec::with_capacity(self.projections.len());
        for projection in &self.projections {
            projections.push(self.projection(projection)?);
        }

        Ok(QuerySpec {
            entity: schema.name,
            table: schema.table,
            columns: schema.columns(),
            filter: Filter::all(filters),
            order,
            limit: self.limit,
            offset: self.offset,
            projections,
            aggregate,
        })
    }

    fn projection(&self, projection: &Projection) -> Result<ProjectionSpec> {
        let schema = self.schema;
        let alias = match projection {
            Projection::Field { alias, .. } | Projection::Literal { alias, .. } => alias,
        };
        if schema.columns().contains(&alias.as_str()) {
            return Err(OrmError::validation(
                schema.name,
                alias,
                "projection alias shadows a column",
            ));
        }
        Ok(match projection {
            Projection::Field { field, alias } => ProjectionSpec::Column {
                column: resolve(schema, field)?.0,
                alias: alias.clone(),
            },
            Projection::Literal { value, alias } => ProjectionSpec::Literal {
                value: encode_literal(alias, value)?,
                alias: alias.clone(),
            },
        })
    }

    pub async fn all(self, ctx: &Context) -> Result<Vec<Record>> {
        let spec = self.spec(None)?;
        let rows = self.exec.query(ctx, &spec).await?;
        rows.rows
            .iter()
            .map(|row| Record::decode(self.schema, &rows.columns, row))
            .collect()
    }

    /// Typed variant of [`Query::all`].
    pub async fn all_as<E: Entity>(self, ctx: &Context) -> Result<Vec<E>> {
        self.all(ctx)
            .await?
            .iter()
            .map(E::from_record)
            .collect()
    }

    pub async fn first(self, ctx: &Context) -> Result<Record> {
        let entity = self.schema.name;
        self.limit(1)
            .all(ctx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(entity, "no matching row"))
    }

    /// The single matching row. Fails when none or more than one match.
    pub async fn only(self, ctx: &Context) -> Result<Record> {
        let schema = self.schema;
        let mut lookup = self.spec(None)?;
        lookup.limit = Some(2);

        let rows = self.exec.query(ctx, &lookup).await?;
        match rows.rows.len() {
            0 => Err(OrmError::not_found(schema.name, "no matching row")),
            1 => Record::decode(schema, &rows.columns, &rows.rows[0]),
            _ => {
                let count = self.count(ctx).await?;
                Err(OrmError::NotSingular {
                    entity: schema.name.to_string(),
                    count: count as usize,
                })
            }
        }
    }

    /// Row by id. Soft-deleted rows count as missing unless `with_deleted`.
    pub async fn get(self, ctx: &Context, id: impl Into<Value>) -> Result<Record> {
        let id = id.into();
        let entity = self.schema.name;
        self.filter(predicate::eq("id", id.clone()))
            .limit(1)
            .all(ctx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(entity, &id))
    }

    pub async fn ids(self, ctx: &Context) -> Result<Vec<Value>> {
        let schema = self.schema;
        let mut spec = self.spec(None)?;
        spec.columns = vec![schema.id.column];
        spec.projections.clear();

        let rows = self.exec.query(ctx, &spec).await?;
        rows.rows
            .iter()
            .map(|row| match row.first() {
                Some(value) => codec::decode(schema.id.column, schema.id.kind.field_type(), value),
                None => Ok(Value::Null),
            })
            .collect()
    }

    pub async fn count(self, ctx: &Context) -> Result<u64> {
        match self.aggregate(ctx, Aggregate::Count).await? {
            Value::Int(n) => Ok(n.max(0) as u64),
            other => Err(OrmError::type_mismatch(
                "count",
                format!("expected an integer, got {}", other.type_name()),
            )),
        }
    }

    pub async fn exist(self, ctx: &Context) -> Result<bool> {
        let mut spec = self.spec(None)?;
        spec.limit = Some(1);
        spec.columns = vec![self.schema.id.column];
        spec.projections.clear();
        Ok(!self.exec.query(ctx, &spec).await?.is_empty())
    }

    pub async fn aggregate(self, ctx: &Context, aggregate: Aggregate) -> Result<Value> {
        let schema = self.schema;
        let (func, field) = match &aggregate {
            Aggregate::Count => (AggregateFunc::Count, None),
            Aggregate::Sum(f) => (AggregateFunc::Sum, Some(f.as_str())),
            Aggregate::Min(f) => (AggregateFunc::Min, Some(f.as_str())),
            Aggregate::Max(f) => (AggregateFunc::Max, Some(f.as_str())),
        };
        let target = field.map(|f| resolve(schema, f)).transpose()?;

        if func == AggregateFunc::Sum
            && let Some((column, ty)) = target
            && !matches!(ty, FieldType::Int | FieldType::Float | FieldType::Decimal)
        {
            return Err(OrmError::validation(
                schema.name,
                column,
                format!("cannot sum a {} column", ty),
            ));
        }

        let spec = self.spec(Some(AggregateSpec {
            func,
            column: target.map(|(column, _)| column),
        }))?;
        let rows = self.exec.query(ctx, &spec).await?;
        let value = rows
            .rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(SqlValue::Null);

        match target {
            Some((column, ty)) if func != AggregateFunc::Count => codec::decode(column, ty, &value),
            _ => codec::decode("count", FieldType::Int, &value),
        }
    }
}

/// Re-reads rows by id, in the order given. Includes soft-deleted rows.
pub(crate) async fn fetch_by_ids(
    exec: Executor<'_>,
    ctx: &Context,
    schema: &'static EntitySchema,
    ids: &[Value],
) -> Result<Vec<Record>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let records = Query::new(exec, schema)
        .with_deleted()
        .filter(predicate::is_in("id", ids.iter().cloned()))
        .all(ctx)
        .await?;

    ids.iter()
        .map(|id| {
            records
                .iter()
                .find(|r| r.id() == id)
                .cloned()
                .ok_or_else(|| OrmError::not_found(schema.name, id))
        })
        .collect()
}

fn resolve(schema: &EntitySchema, name: &str) -> Result<(&'static str, FieldType)> {
    schema
        .resolve_column(name)
        .ok_or_else(|| OrmError::UnknownField(name.to_string()))
}

fn encode_literal(alias: &str, value: &Value) -> Result<SqlValue> {
    let ty = match value {
        Value::Null => return Ok(SqlValue::Null),
        Value::Bool(_) => FieldType::Bool,
        Value::Int(_) => FieldType::Int,
        Value::Float(_) => FieldType::Float,
        Value::Text(_) => FieldType::Text,
        Value::Decimal(_) => FieldType::Decimal,
        Value::Time(_) => FieldType::Time,
        Value::Json(_) => FieldType::Json,
    };
    codec::encode(alias, ty, value)
}
