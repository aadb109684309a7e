//! Declarative read pipelines over the entity store.
//!
//! A [`Pipeline`] is an ordered list of stages (match, lookup, project, unset,
//! sort, skip, limit) over one base [`Collection`]. It compiles to a single
//! SQLite statement and returns JSON documents, so joins, projection and
//! pagination all happen inside the database.
//!
//! Lookups join one referenced document through key equality. Because the
//! foreign key is a single identifier the join yields at most one match, which
//! is flattened into an embedded object:
//!
//! * [`Flatten::First`] keeps the parent when the reference is dangling and
//!   leaves the embedded field out.
//! * [`Flatten::Unwind`] drops parents whose reference is dangling.

mod collection;
pub mod views;

use rusqlite::types::{Value, ValueRef};
use serde_json::{Map, Number, Value as Json};

use crate::pagination::{Page, PageRequest};

pub use collection::{output_key, Collection, Column, ColumnKind};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown field `{field}` on {collection}")]
    UnknownField {
        collection: Collection,
        field: String,
    },

    #[error("field `{field}` on {collection} cannot be projected")]
    SensitiveField {
        collection: Collection,
        field: String,
    },

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Row filter over base-collection fields.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Equality; `Value::Null` matches missing values.
    Eq(&'static str, Value),
    /// Case-insensitive substring match against any of the listed text fields.
    Search(Vec<&'static str>, String),
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(field, value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flatten {
    First,
    Unwind,
}

/// Join one referenced document into the output under `as_field`.
#[derive(Debug, Clone)]
pub struct Lookup {
    from: Collection,
    local_field: &'static str,
    foreign_field: &'static str,
    as_field: &'static str,
    project: Vec<&'static str>,
    flatten: Flatten,
}

impl Lookup {
    pub fn new(
        from: Collection,
        local_field: &'static str,
        foreign_field: &'static str,
        as_field: &'static str,
    ) -> Self {
        Self {
            from,
            local_field,
            foreign_field,
            as_field,
            project: Vec::new(),
            flatten: Flatten::First,
        }
    }

    /// Restrict the embedded document to these fields. Without a projection
    /// every public field of the joined collection is embedded.
    pub fn project(mut self, fields: &[&'static str]) -> Self {
        self.project = fields.to_vec();
        self
    }

    pub fn unwind(mut self) -> Self {
        self.flatten = Flatten::Unwind;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Lookup(Lookup),
    Project(Vec<&'static str>),
    Unset(Vec<&'static str>),
    Sort(&'static str, SortDirection),
    Skip(i64),
    Limit(i64),
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    collection: Collection,
    stages: Vec<Stage>,
}

/// One entry of the output document, in select-list order.
#[derive(Debug)]
enum OutputField {
    Base(&'static Column),
    /// Selected ahead of `columns`: the joined key, NULL when nothing matched.
    Embedded {
        key: &'static str,
        columns: Vec<&'static Column>,
    },
    /// Selected only so the statement has a column list.
    Hidden,
}

#[derive(Debug)]
pub struct CompiledQuery {
    pub sql: String,
    pub count_sql: String,
    /// Bound in order by both `sql` and `count_sql`.
    pub params: Vec<Value>,
    plan: Vec<OutputField>,
}

const BASE: &str = "b";

impl Pipeline {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            stages: Vec::new(),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn matching(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn lookup(self, lookup: Lookup) -> Self {
        self.stage(Stage::Lookup(lookup))
    }

    pub fn project(self, fields: &[&'static str]) -> Self {
        self.stage(Stage::Project(fields.to_vec()))
    }

    pub fn unset(self, fields: &[&'static str]) -> Self {
        self.stage(Stage::Unset(fields.to_vec()))
    }

    pub fn sort(self, field: &'static str, direction: SortDirection) -> Self {
        self.stage(Stage::Sort(field, direction))
    }

    pub fn skip(self, n: i64) -> Self {
        self.stage(Stage::Skip(n))
    }

    pub fn limit(self, n: i64) -> Self {
        self.stage(Stage::Limit(n))
    }

    fn base_column(&self, field: &str) -> Result<&'static Column, PipelineError> {
        self.collection
            .column(field)
            .ok_or_else(|| PipelineError::UnknownField {
                collection: self.collection,
                field: field.to_string(),
            })
    }

    pub fn compile(&self) -> Result<CompiledQuery, PipelineError> {
        let mut filters: Vec<&Filter> = Vec::new();
        let mut joins: Vec<(String, bool)> = Vec::new();
        // (output key, join alias, join key column, embedded columns)
        let mut embedded: Vec<(&'static str, String, &'static Column, Vec<&'static Column>)> =
            Vec::new();
        let mut visible: Vec<String> = self
            .collection
            .public_columns()
            .map(|c| c.name.to_string())
            .collect();
        let mut sort: Option<(&'static Column, SortDirection)> = None;
        let mut skip: Option<i64> = None;
        let mut limit: Option<i64> = None;

        for stage in &self.stages {
            match stage {
                Stage::Match(filter) => filters.push(filter),
                Stage::Lookup(lookup) => {
                    let alias = format!("j{}", joins.len());
                    let local = self.base_column(lookup.local_field)?;
                    let foreign = lookup.from.column(lookup.foreign_field).ok_or_else(|| {
                        PipelineError::UnknownField {
                            collection: lookup.from,
                            field: lookup.foreign_field.to_string(),
                        }
                    })?;

                    let mut columns = Vec::new();
                    if lookup.project.is_empty() {
                        columns.extend(lookup.from.public_columns());
                    } else {
                        for field in &lookup.project {
                            let column = lookup.from.column(field).ok_or_else(|| {
                                PipelineError::UnknownField {
                                    collection: lookup.from,
                                    field: field.to_string(),
                                }
                            })?;
                            if column.sensitive {
                                return Err(PipelineError::SensitiveField {
                                    collection: lookup.from,
                                    field: field.to_string(),
                                });
                            }
                            columns.push(column);
                        }
                    }

                    let join_kind = match lookup.flatten {
                        Flatten::First => "LEFT JOIN",
                        Flatten::Unwind => "JOIN",
                    };
                    joins.push((
                        format!(
                            "{} {} AS {} ON {}.{} = {}.{}",
                            join_kind,
                            lookup.from.table(),
                            alias,
                            alias,
                            foreign.name,
                            BASE,
                            local.name
                        ),
                        lookup.flatten == Flatten::Unwind,
                    ));
                    embedded.push((lookup.as_field, alias, foreign, columns));
                    visible.retain(|f| f != lookup.as_field);
                    visible.push(lookup.as_field.to_string());
                }
                Stage::Project(fields) => {
                    let mut next = Vec::with_capacity(fields.len());
                    for field in fields {
                        if embedded.iter().any(|(key, ..)| key == field) {
                            next.push(field.to_string());
                            continue;
                        }
                        let column = self.base_column(field)?;
                        if column.sensitive {
                            return Err(PipelineError::SensitiveField {
                                collection: self.collection,
                                field: field.to_string(),
                            });
                        }
                        next.push(column.name.to_string());
                    }
                    visible = next;
                }
                Stage::Unset(fields) => {
                    visible.retain(|f| !fields.iter().any(|unset| *unset == f.as_str()))
                }
                Stage::Sort(field, direction) => {
                    sort = Some((self.base_column(field)?, *direction));
                }
                // Windows compose in stage order: a skip after a limit eats
                // into it, and stacked limits keep the smallest.
                Stage::Skip(n) => {
                    let n = (*n).max(0);
                    skip = Some(skip.unwrap_or(0).saturating_add(n));
                    limit = limit.map(|l| l.saturating_sub(n).max(0));
                }
                Stage::Limit(n) => {
                    let n = (*n).max(0);
                    limit = Some(limit.map_or(n, |l| l.min(n)));
                }
            }
        }

        let mut plan = Vec::new();
        let mut select = Vec::new();
        for field in &visible {
            if let Some((key, alias, marker, columns)) =
                embedded.iter().find(|(key, ..)| *key == field.as_str())
            {
                select.push(format!("{}.{}", alias, marker.name));
                for column in columns {
                    select.push(format!("{}.{}", alias, column.name));
                }
                plan.push(OutputField::Embedded {
                    key: *key,
                    columns: columns.clone(),
                });
            } else {
                let column = self.base_column(field)?;
                select.push(format!("{}.{}", BASE, column.name));
                plan.push(OutputField::Base(column));
            }
        }
        if select.is_empty() {
            select.push(format!("{}.id", BASE));
            plan.push(OutputField::Hidden);
        }

        let mut params = Vec::new();
        let where_sql = if filters.is_empty() {
            String::new()
        } else {
            let mut parts = Vec::new();
            for filter in &filters {
                parts.push(self.filter_sql(filter, &mut params)?);
            }
            format!(" WHERE {}", parts.join(" AND "))
        };

        let from_sql = format!("{} AS {}", self.collection.table(), BASE);
        let join_sql: String = joins.iter().map(|(j, _)| format!(" {}", j)).collect();
        let inner_join_sql: String = joins
            .iter()
            .filter(|(_, inner)| *inner)
            .map(|(j, _)| format!(" {}", j))
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}{}{}",
            select.join(", "),
            from_sql,
            join_sql,
            where_sql
        );
        if let Some((column, direction)) = sort {
            sql.push_str(&format!(
                " ORDER BY {}.{} {}, {}.id {}",
                BASE,
                column.name,
                direction.sql(),
                BASE,
                direction.sql()
            ));
        }
        match (limit, skip) {
            (Some(limit), Some(skip)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, skip)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", skip)),
            (None, None) => {}
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM {}{}{}",
            from_sql, inner_join_sql, where_sql
        );

        Ok(CompiledQuery {
            sql,
            count_sql,
            params,
            plan,
        })
    }

    fn filter_sql(&self, filter: &Filter, params: &mut Vec<Value>) -> Result<String, PipelineError> {
        Ok(match filter {
            Filter::Eq(field, Value::Null) => {
                format!("{}.{} IS NULL", BASE, self.base_column(field)?.name)
            }
            Filter::Eq(field, value) => {
                let column = self.base_column(field)?;
                params.push(value.clone());
                format!("{}.{} = ?", BASE, column.name)
            }
            Filter::Search(fields, text) => {
                if fields.is_empty() {
                    return Ok("1 = 1".to_string());
                }
                let pattern = format!("%{}%", escape_like(text));
                let mut parts = Vec::new();
                for field in fields {
                    let column = self.base_column(field)?;
                    params.push(Value::Text(pattern.clone()));
                    parts.push(format!("{}.{} LIKE ? ESCAPE '\\'", BASE, column.name));
                }
                format!("({})", parts.join(" OR "))
            }
            Filter::Or(filters) | Filter::And(filters) if filters.is_empty() => {
                // Empty OR matches nothing, empty AND matches everything.
                if matches!(filter, Filter::Or(_)) { "1 = 0" } else { "1 = 1" }.to_string()
            }
            Filter::Or(filters) => {
                let parts = filters
                    .iter()
                    .map(|f| self.filter_sql(f, params))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("({})", parts.join(" OR "))
            }
            Filter::And(filters) => {
                let parts = filters
                    .iter()
                    .map(|f| self.filter_sql(f, params))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("({})", parts.join(" AND "))
            }
        })
    }

    /// Execute and return every matching document.
    pub fn run(&self, conn: &rusqlite::Connection) -> Result<Vec<Json>, PipelineError> {
        let compiled = self.compile()?;
        let mut stmt = conn.prepare(&compiled.sql)?;
        let docs = stmt
            .query_map(rusqlite::params_from_iter(compiled.params.iter()), |row| {
                decode_row(row, &compiled.plan)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn first(&self, conn: &rusqlite::Connection) -> Result<Option<Json>, PipelineError> {
        Ok(self.clone().limit(1).run(conn)?.into_iter().next())
    }

    pub fn count(&self, conn: &rusqlite::Connection) -> Result<i64, PipelineError> {
        let compiled = self.compile()?;
        let total = conn.query_row(
            &compiled.count_sql,
            rusqlite::params_from_iter(compiled.params.iter()),
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Window the result set with `skip = (page - 1) * limit` and wrap it with
    /// page metadata. Add a sort stage first for stable pages.
    pub fn paginate(
        self,
        conn: &rusqlite::Connection,
        request: PageRequest,
    ) -> Result<Page<Json>, PipelineError> {
        let total = self.count(conn)?;
        let docs = self
            .skip(request.skip())
            .limit(request.limit())
            .run(conn)?;
        Ok(Page::new(docs, total, request))
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn decode_row(row: &rusqlite::Row<'_>, plan: &[OutputField]) -> rusqlite::Result<Json> {
    let mut doc = Map::new();
    let mut idx = 0;
    for field in plan {
        match field {
            OutputField::Base(column) => {
                doc.insert(
                    output_key(column.name),
                    decode_value(row.get_ref(idx)?, column.kind),
                );
                idx += 1;
            }
            OutputField::Embedded { key, columns } => {
                let present = !matches!(row.get_ref(idx)?, ValueRef::Null);
                idx += 1;
                let mut nested = Map::new();
                for column in columns {
                    nested.insert(
                        output_key(column.name),
                        decode_value(row.get_ref(idx)?, column.kind),
                    );
                    idx += 1;
                }
                if present {
                    doc.insert(key.to_string(), Json::Object(nested));
                }
            }
            OutputField::Hidden => idx += 1,
        }
    }
    Ok(Json::Object(doc))
}

fn decode_value(value: ValueRef<'_>, kind: ColumnKind) -> Json {
    match (value, kind) {
        (ValueRef::Null, _) => Json::Null,
        (ValueRef::Integer(i), ColumnKind::Bool) => Json::Bool(i != 0),
        (ValueRef::Integer(i), ColumnKind::Real) => {
            Number::from_f64(i as f64).map(Json::Number).unwrap_or(Json::Null)
        }
        (ValueRef::Integer(i), _) => Json::Number(i.into()),
        (ValueRef::Real(f), _) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        (ValueRef::Text(t), _) => Json::String(String::from_utf8_lossy(t).into_owned()),
        (ValueRef::Blob(_), _) => Json::Null,
    }
}
