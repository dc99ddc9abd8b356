use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::{Executor, MySql};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Decimal(Decimal),
    Date(NaiveDate),
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Collects `column = ?` assignments for a partial update. Column names are
/// always compile-time constants; only values come from the request.
#[derive(Debug)]
pub struct UpdateBuilder {
    table: &'static str,
    sets: Vec<(&'static str, SqlValue)>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) -> &mut Self {
        self.sets.push((column, value.into()));
        self
    }

    /// Skips the column when the request left it out.
    pub fn set_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set(column, v);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Builds `UPDATE table SET ... WHERE id_column = ? [AND extra]`.
    pub fn build(self, id_column: &str, id_value: u64, extra_where: Option<&str>) -> Result<SqlUpdate, AppError> {
        if self.sets.is_empty() {
            return Err(AppError::BadRequest("No fields provided for update".to_string()));
        }

        let set_clause = self
            .sets
            .iter()
            .map(|(k, _)| format!("{} = ?", k))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("UPDATE {} SET {} WHERE {} = ?", self.table, set_clause, id_column);
        if let Some(extra) = extra_where {
            sql.push_str(" AND ");
            sql.push_str(extra);
        }

        let mut values: Vec<SqlValue> = self.sets.into_iter().map(|(_, v)| v).collect();
        values.push(SqlValue::U64(id_value));

        Ok(SqlUpdate { sql, values })
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let SqlUpdate { sql, values } = update;
    let mut query = sqlx::query(&sql);

    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Decimal(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// ===============================
/// Dynamic WHERE clause for list screens
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

#[derive(Debug, Default)]
pub struct Filters {
    clauses: Vec<String>,
    args: Vec<FilterValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause with one `?` placeholder per value.
    pub fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = FilterValue>) -> &mut Self {
        self.clauses.push(clause.into());
        self.args.extend(values);
        self
    }

    /// Adds a clause without placeholders.
    pub fn push_raw(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn args(&self) -> &[FilterValue] {
        &self.args
    }

    pub fn bind_as<'q, O>(
        &self,
        mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    ) -> QueryAs<'q, MySql, O, MySqlArguments> {
        for arg in &self.args {
            query = match arg.clone() {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Str(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
            };
        }
        query
    }

    pub fn bind_scalar<'q, O>(
        &self,
        mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    ) -> QueryScalar<'q, MySql, O, MySqlArguments> {
        for arg in &self.args {
            query = match arg.clone() {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Str(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
            };
        }
        query
    }
}

/// `%term%` for LIKE searches, with wildcards in the term escaped.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_update_with_extra_guard() {
        let mut builder = UpdateBuilder::new("payroll_records");
        builder
            .set("allowance", Decimal::new(50000, 2))
            .set_opt::<u64>("approved_by", None)
            .set_opt("status", Some("pending".to_string()));

        let update = builder.build("id", 9, Some("status = 'pending'")).unwrap();
        assert_eq!(
            update.sql,
            "UPDATE payroll_records SET allowance = ?, status = ? WHERE id = ? AND status = 'pending'"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::Decimal(Decimal::new(50000, 2)),
                SqlValue::String("pending".into()),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn filters_join_clauses_in_order() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_sql(), "");

        filters
            .push_raw("e.deleted_at IS NULL")
            .push("p.employee_id = ?", [FilterValue::U64(4)])
            .push("p.status = ?", [FilterValue::Str("approved".into())]);
        assert_eq!(filters.where_sql(), " WHERE e.deleted_at IS NULL AND p.employee_id = ? AND p.status = ?");
        assert_eq!(filters.args().len(), 2);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" ana "), "%ana%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn empty_update_is_a_bad_request() {
        let err = UpdateBuilder::new("employees").build("id", 1, None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
