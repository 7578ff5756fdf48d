// ============================================================================
// SQL Rendering
// ============================================================================
//
// Turns statement and query specs into parameterized SQL for a concrete
// dialect. Values never appear in the SQL text: every operand becomes a
// placeholder with its value appended to `params`. Identifiers come from
// static schemas and are always quoted.
//
// ============================================================================

use crate::core::{OrmError, Result, SqlValue};
use crate::schema::Relation;
use crate::spec::{
    AggregateFunc, ConflictAction, ConflictSpec, CreateSpec, DeleteSpec, EdgeSpec, Filter, IdSpec,
    Order, ProjectionSpec, QuerySpec, Resolution, Statement, UpdateSpec,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn supports_returning(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::MySql => write!(f, "mysql"),
        }
    }
}

/// One SQL statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Renders a statement. A single spec may need several SQL statements (edge
/// synchronization on child tables); a batch yields them in item order and
/// must be executed inside one transaction.
pub fn render(dialect: Dialect, statement: &Statement) -> Result<Vec<Rendered>> {
    let mut out = Vec::new();
    render_into(dialect, statement, &mut out)?;
    Ok(out)
}

fn render_into(dialect: Dialect, statement: &Statement, out: &mut Vec<Rendered>) -> Result<()> {
    match statement {
        Statement::Create(spec) => render_create(dialect, spec, out),
        Statement::Update(spec) => render_update(dialect, spec, out),
        Statement::Delete(spec) => {
            out.push(render_delete(dialect, spec));
            Ok(())
        }
        Statement::Batch(items) => {
            for item in items {
                render_into(dialect, item, out)?;
            }
            Ok(())
        }
    }
}

/// Renders a read. An aggregate over a limited or offset query folds only the
/// rows of that window, selected by a subquery.
pub fn render_query(dialect: Dialect, spec: &QuerySpec) -> Rendered {
    let mut w = Writer::new(dialect);

    let Some(aggregate) = &spec.aggregate else {
        let mut items: Vec<String> = spec.columns.iter().map(|c| w.ident(c)).collect();
        for projection in &spec.projections {
            let expr = match projection {
                ProjectionSpec::Column { column, .. } => w.ident(column),
                ProjectionSpec::Literal { value, .. } => w.param(value.clone()),
            };
            items.push(format!("{} AS {}", expr, w.ident(projection.alias())));
        }
        w.push("SELECT ");
        w.push(&items.join(", "));
        w.push(" FROM ");
        w.push_ident(spec.table);
        w.filter(spec.filter.as_ref());
        w.order_by(&spec.order);
        w.limit(spec.limit, spec.offset);
        return w.finish();
    };

    let func = match aggregate.func {
        AggregateFunc::Count => "COUNT",
        AggregateFunc::Sum => "SUM",
        AggregateFunc::Min => "MIN",
        AggregateFunc::Max => "MAX",
    };
    let target = match aggregate.column {
        Some(column) => w.ident(column),
        None => "*".to_string(),
    };
    w.push(&format!("SELECT {}({}) FROM ", func, target));

    if spec.limit.is_none() && spec.offset.is_none() {
        w.push_ident(spec.table);
        w.filter(spec.filter.as_ref());
        return w.finish();
    }

    let inner = match aggregate.column {
        Some(_) => target,
        None => "1".to_string(),
    };
    w.push(&format!("(SELECT {} FROM ", inner));
    w.push_ident(spec.table);
    w.filter(spec.filter.as_ref());
    w.order_by(&spec.order);
    w.limit(spec.limit, spec.offset);
    w.push(") AS ");
    w.push_ident("windowed");
    w.finish()
}

fn render_create(dialect: Dialect, spec: &CreateSpec, out: &mut Vec<Rendered>) -> Result<()> {
    let mut w = Writer::new(dialect);
    let do_nothing = matches!(
        spec.on_conflict,
        Some(ConflictSpec { action: ConflictAction::DoNothing, .. })
    );

    if dialect == Dialect::MySql && do_nothing {
        w.push("INSERT IGNORE INTO ");
    } else {
        w.push("INSERT INTO ");
    }
    w.push_ident(spec.table);

    let mut columns = Vec::new();
    let mut values = Vec::new();
    if let IdSpec::Value(id) = &spec.id {
        columns.push(w.ident(spec.id_column));
        values.push(w.param(id.clone()));
    }
    for (column, value) in spec.row_values() {
        columns.push(w.ident(column));
        values.push(w.param(value));
    }

    if columns.is_empty() {
        w.push(match dialect {
            Dialect::MySql => " () VALUES ()",
            Dialect::Postgres | Dialect::Sqlite => " DEFAULT VALUES",
        });
    } else {
        w.push(&format!(" ({}) VALUES ({})", columns.join(", "), values.join(", ")));
    }

    if let Some(conflict) = &spec.on_conflict {
        w.conflict(spec, conflict);
    }
    if dialect.supports_returning() {
        w.push(" RETURNING ");
        w.push_ident(spec.id_column);
    }
    out.push(w.finish());

    let children: Vec<&EdgeSpec> = spec
        .edges
        .iter()
        .filter(|e| e.relation == Relation::OneToMany && !e.add.is_empty())
        .collect();
    if children.is_empty() {
        return Ok(());
    }
    let IdSpec::Value(id) = &spec.id else {
        return Err(OrmError::Capability {
            backend: dialect.to_string(),
            operation: format!("one-to-many edges on a create of {} with a store-assigned id", spec.entity),
        });
    };
    for edge in children {
        let mut w = Writer::new(dialect);
        w.push("UPDATE ");
        w.push_ident(edge.table);
        w.push(" SET ");
        w.push_ident(edge.column);
        w.push(" = ");
        w.push_param(id.clone());
        w.filter(Some(&Filter::In(edge.target_key, edge.add.clone())));
        out.push(w.finish());
    }
    Ok(())
}

fn render_update(dialect: Dialect, spec: &UpdateSpec, out: &mut Vec<Rendered>) -> Result<()> {
    // Child rows are relinked before the parent row changes, so the parent
    // filter still sees the values it was written against.
    for edge in spec.edges.iter().filter(|e| e.relation == Relation::OneToMany) {
        render_child_edge(dialect, spec, edge, out);
    }

    let mut w = Writer::new(dialect);
    let mut sets = Vec::new();
    for assignment in &spec.assignments {
        let column = w.ident(assignment.column);
        let value = w.param(assignment.value.clone());
        sets.push(format!("{} = {}", column, value));
    }
    for column in &spec.cleared {
        sets.push(format!("{} = NULL", w.ident(column)));
    }
    for edge in spec.edges.iter().filter(|e| e.relation == Relation::ManyToOne) {
        let column = w.ident(edge.column);
        match edge.add.first() {
            Some(id) => {
                let value = w.param(id.clone());
                sets.push(format!("{} = {}", column, value));
            }
            None if edge.clear || !edge.remove.is_empty() => sets.push(format!("{} = NULL", column)),
            None => {}
        }
    }
    if sets.is_empty() {
        return Ok(());
    }

    w.push("UPDATE ");
    w.push_ident(spec.table);
    w.push(" SET ");
    w.push(&sets.join(", "));
    w.filter(spec.filter.as_ref());
    out.push(w.finish());
    Ok(())
}

/// Subquery selecting the ids of the parent rows an update targets.
fn parent_ids(w: &mut Writer, spec: &UpdateSpec) -> String {
    let mut sub = Writer::nested(w);
    sub.push("SELECT ");
    sub.push_ident(spec.id_column);
    sub.push(" FROM ");
    sub.push_ident(spec.table);
    sub.filter(spec.filter.as_ref());
    let sql = sub.sql;
    w.params = sub.params;
    format!("({})", sql)
}

fn render_child_edge(dialect: Dialect, spec: &UpdateSpec, edge: &EdgeSpec, out: &mut Vec<Rendered>) {
    if edge.clear {
        let mut w = Writer::new(dialect);
        w.push("UPDATE ");
        w.push_ident(edge.table);
        w.push(" SET ");
        w.push_ident(edge.column);
        w.push(" = NULL WHERE ");
        w.push_ident(edge.column);
        w.push(" IN ");
        let parents = parent_ids(&mut w, spec);
        w.push(&parents);
        out.push(w.finish());
    }
    if !edge.remove.is_empty() {
        let mut w = Writer::new(dialect);
        w.push("UPDATE ");
        w.push_ident(edge.table);
        w.push(" SET ");
        w.push_ident(edge.column);
        w.push(" = NULL WHERE ");
        w.filter_expr(&Filter::In(edge.target_key, edge.remove.clone()));
        w.push(" AND ");
        w.push_ident(edge.column);
        w.push(" IN ");
        let parents = parent_ids(&mut w, spec);
        w.push(&parents);
        out.push(w.finish());
    }
    if !edge.add.is_empty() {
        let mut w = Writer::new(dialect);
        w.push("UPDATE ");
        w.push_ident(edge.table);
        w.push(" SET ");
        w.push_ident(edge.column);
        w.push(" = ");
        match &spec.target_id {
            Some(id) => w.push_param(id.clone()),
            None => {
                let parents = parent_ids(&mut w, spec);
                w.push(&parents);
            }
        }
        w.filter(Some(&Filter::In(edge.target_key, edge.add.clone())));
        out.push(w.finish());
    }
}

fn render_delete(dialect: Dialect, spec: &DeleteSpec) -> Rendered {
    let mut w = Writer::new(dialect);
    w.push("DELETE FROM ");
    w.push_ident(spec.table);
    w.filter(spec.filter.as_ref());
    w.finish()
}

/// Accumulates SQL text and parameters, numbering placeholders as it goes.
struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl Writer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Writer that continues the parameter numbering of `outer`.
    fn nested(outer: &mut Writer) -> Self {
        Self {
            dialect: outer.dialect,
            sql: String::new(),
            params: std::mem::take(&mut outer.params),
        }
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn ident(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    fn push_ident(&mut self, ident: &str) {
        let quoted = self.ident(ident);
        self.sql.push_str(&quoted);
    }

    fn param(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}", self.params.len()),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn push_param(&mut self, value: SqlValue) {
        let placeholder = self.param(value);
        self.sql.push_str(&placeholder);
    }

    fn filter(&mut self, filter: Option<&Filter>) {
        if let Some(filter) = filter {
            self.push(" WHERE ");
            self.filter_expr(filter);
        }
    }

    fn filter_expr(&mut self, filter: &Filter) {
        match filter {
            Filter::Eq(c, v) => self.compare(c, "=", v),
            Filter::Ne(c, v) => self.compare(c, "<>", v),
            Filter::Gt(c, v) => self.compare(c, ">", v),
            Filter::Gte(c, v) => self.compare(c, ">=", v),
            Filter::Lt(c, v) => self.compare(c, "<", v),
            Filter::Lte(c, v) => self.compare(c, "<=", v),
            Filter::In(c, values) => self.membership(c, "IN", values),
            Filter::NotIn(c, values) => self.membership(c, "NOT IN", values),
            Filter::IsNull(c) => {
                self.push_ident(c);
                self.push(" IS NULL");
            }
            Filter::NotNull(c) => {
                self.push_ident(c);
                self.push(" IS NOT NULL");
            }
            Filter::Contains(c, needle) => {
                self.push_ident(c);
                self.push(" LIKE ");
                self.push_param(SqlValue::Text(format!("%{}%", escape_like(needle))));
                self.push(" ESCAPE '\\'");
            }
            Filter::And(items) => self.junction(items, " AND ", "1 = 1"),
            Filter::Or(items) => self.junction(items, " OR ", "1 = 0"),
            Filter::Not(inner) => {
                self.push("NOT (");
                self.filter_expr(inner);
                self.push(")");
            }
        }
    }

    fn compare(&mut self, column: &str, op: &str, value: &SqlValue) {
        self.push_ident(column);
        self.push(&format!(" {} ", op));
        self.push_param(value.clone());
    }

    fn membership(&mut self, column: &str, op: &str, values: &[SqlValue]) {
        if values.is_empty() {
            self.push(if op == "IN" { "1 = 0" } else { "1 = 1" });
            return;
        }
        self.push_ident(column);
        self.push(&format!(" {} (", op));
        let placeholders: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
        self.push(&placeholders.join(", "));
        self.push(")");
    }

    fn junction(&mut self, items: &[Filter], sep: &str, empty: &str) {
        if items.is_empty() {
            self.push(empty);
            return;
        }
        self.push("(");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            self.filter_expr(item);
        }
        self.push(")");
    }

    fn order_by(&mut self, order: &[(&'static str, Order)]) {
        if order.is_empty() {
            return;
        }
        let dialect = self.dialect;
        let items: Vec<String> = order
            .iter()
            .map(|(column, order)| {
                let column = self.ident(column);
                match (dialect, order) {
                    (Dialect::Postgres, Order::Asc) => format!("{} ASC NULLS FIRST", column),
                    (Dialect::Postgres, Order::Desc) => format!("{} DESC NULLS LAST", column),
                    (_, Order::Asc) => format!("{} ASC", column),
                    (_, Order::Desc) => format!("{} DESC", column),
                }
            })
            .collect();
        self.push(" ORDER BY ");
        self.push(&items.join(", "));
    }

    fn limit(&mut self, limit: Option<usize>, offset: Option<usize>) {
        match (limit, offset, self.dialect) {
            (Some(limit), _, _) => self.push(&format!(" LIMIT {}", limit)),
            (None, Some(_), Dialect::Sqlite) => self.push(" LIMIT -1"),
            (None, Some(_), Dialect::MySql) => self.push(" LIMIT 18446744073709551615"),
            _ => {}
        }
        if let Some(offset) = offset {
            self.push(&format!(" OFFSET {}", offset));
        }
    }

    fn conflict(&mut self, spec: &CreateSpec, conflict: &ConflictSpec) {
        let dialect = self.dialect;
        let table = self.ident(spec.table);
        let id = self.ident(spec.id_column);

        if dialect == Dialect::MySql {
            // INSERT IGNORE already covers DO NOTHING.
            let ConflictAction::Update(columns) = &conflict.action else {
                return;
            };
            self.push(" ON DUPLICATE KEY UPDATE ");
            if columns.is_empty() {
                self.push(&format!("{} = {}", id, id));
                return;
            }
            let sets: Vec<String> = columns
                .iter()
                .map(|c| {
                    let column = self.ident(c.column);
                    let value = match &c.resolution {
                        Resolution::New => format!("VALUES({})", column),
                        Resolution::Existing => column.clone(),
                        Resolution::Value(v) => self.param(v.clone()),
                    };
                    format!("{} = {}", column, value)
                })
                .collect();
            self.push(&sets.join(", "));
            return;
        }

        let target: Vec<String> = conflict.target.iter().map(|c| self.ident(c)).collect();
        self.push(&format!(" ON CONFLICT ({})", target.join(", ")));
        match &conflict.action {
            ConflictAction::DoNothing => self.push(" DO NOTHING"),
            ConflictAction::Update(columns) if columns.is_empty() => {
                self.push(&format!(" DO UPDATE SET {} = {}.{}", id, table, id));
            }
            ConflictAction::Update(columns) => {
                let sets: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let column = self.ident(c.column);
                        let value = match &c.resolution {
                            Resolution::New => format!("excluded.{}", column),
                            Resolution::Existing => format!("{}.{}", table, column),
                            Resolution::Value(v) => self.param(v.clone()),
                        };
                        format!("{} = {}", column, value)
                    })
                    .collect();
                self.push(" DO UPDATE SET ");
                self.push(&sets.join(", "));
            }
        }
    }

    fn finish(self) -> Rendered {
        Rendered {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
