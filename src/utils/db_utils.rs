use actix_web::error::ErrorBadRequest;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::MySqlPool;
use std::str::FromStr;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    U8(u8),
    Bool(bool),
    Date(NaiveDate),
    Decimal(Decimal),
    Null,
}

/// Binds every value, in order, onto an sqlx query, query_as or query_scalar.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::String(v) => query.bind(v.as_str()),
                $crate::utils::db_utils::SqlValue::U64(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::U8(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Bool(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Decimal(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}
pub(crate) use bind_values;

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Debug, Default)]
pub struct SqlFilter {
    conditions: Vec<&'static str>,
    pub values: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `condition` holds exactly one `?`.
    pub fn push(&mut self, condition: &'static str, value: SqlValue) {
        self.conditions.push(condition);
        self.values.push(value);
    }

    /// `condition` holds one `?` per value.
    pub fn push_group(&mut self, condition: &'static str, values: Vec<SqlValue>) {
        self.conditions.push(condition);
        self.values.extend(values);
    }

    pub fn push_opt<T>(&mut self, condition: &'static str, value: Option<T>, to_sql: fn(T) -> SqlValue) {
        if let Some(v) = value {
            self.push(condition, to_sql(v));
        }
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }
}

/// ===============================
/// Updatable column rules
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    OptionalText,
    Date,
    RoleId,
    OptionalId,
    Bool,
    Decimal,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
}

fn convert(column: &str, kind: ColumnKind, value: &Value) -> Result<SqlValue, String> {
    let wrong = || format!("Invalid value for '{column}'");

    match (kind, value) {
        (ColumnKind::OptionalText | ColumnKind::OptionalId, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Text, Value::String(s)) if s.trim().is_empty() => {
            Err(format!("'{column}' cannot be empty"))
        }
        (ColumnKind::Text | ColumnKind::OptionalText, Value::String(s)) => {
            Ok(SqlValue::String(s.trim().to_string()))
        }
        (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| format!("'{column}' must be a YYYY-MM-DD date")),
        (ColumnKind::RoleId, Value::Number(n)) => n
            .as_u64()
            .filter(|id| (1..=3).contains(id))
            .map(|id| SqlValue::U8(id as u8))
            .ok_or_else(wrong),
        (ColumnKind::OptionalId, Value::Number(n)) => n.as_u64().map(SqlValue::U64).ok_or_else(wrong),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Bool(*b)),
        (ColumnKind::Decimal, Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map(SqlValue::Decimal)
            .map_err(|_| wrong()),
        (ColumnKind::Decimal, Value::String(s)) => Decimal::from_str(s.trim())
            .map(SqlValue::Decimal)
            .map_err(|_| wrong()),
        _ => Err(wrong()),
    }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only columns named in `allowed` may appear in `payload`.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[(&str, ColumnKind)],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let kind = allowed
            .iter()
            .find(|(name, _)| *name == key.as_str())
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ErrorBadRequest(format!("Field '{key}' cannot be updated")))?;

        values.push(convert(key, kind, value).map_err(ErrorBadRequest)?);
        columns.push(key.clone());
    }

    let set_clause = columns
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {table} SET {set_clause} WHERE {id_column} = ?");

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate {
        sql,
        columns,
        values,
    })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: &SqlUpdate) -> Result<u64, sqlx::Error> {
    let query = bind_values!(sqlx::query(&update.sql), &update.values);
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[(&str, ColumnKind)] = &[
        ("first_name", ColumnKind::Text),
        ("phone", ColumnKind::OptionalText),
        ("role_id", ColumnKind::RoleId),
        ("date_of_joining", ColumnKind::Date),
        ("paid_leaves_balance", ColumnKind::Decimal),
    ];

    #[test]
    fn builds_update_for_allowed_columns() {
        let update = build_update_sql(
            "employees",
            &json!({"first_name": " Ada ", "phone": null, "role_id": 2}),
            ALLOWED,
            "id",
            9,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE employees SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.columns.len(), 3);
        assert_eq!(update.values.len(), 4);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
        assert!(update.values.contains(&SqlValue::String("Ada".into())));
        assert!(update.values.contains(&SqlValue::Null));
        assert!(update.values.contains(&SqlValue::U8(2)));
    }

    #[test]
    fn rejects_columns_outside_the_allow_list() {
        let err = build_update_sql(
            "employees",
            &json!({"password_hash": "x"}),
            ALLOWED,
            "id",
            1,
        );
        assert!(err.is_err());

        let err = build_update_sql("employees", &json!({"id = 1; --": 1}), ALLOWED, "id", 1);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_values_of_the_wrong_shape() {
        for payload in [
            json!({"role_id": 7}),
            json!({"first_name": ""}),
            json!({"date_of_joining": "03/01/2025"}),
            json!({"paid_leaves_balance": "lots"}),
            json!({}),
            json!([1, 2]),
        ] {
            assert!(build_update_sql("employees", &payload, ALLOWED, "id", 1).is_err());
        }
    }

    #[test]
    fn filter_joins_conditions() {
        let mut filter = SqlFilter::new();
        assert_eq!(filter.where_clause(), "");

        filter.push("a.employee_id = ?", SqlValue::U64(3));
        filter.push_opt("a.status = ?", Some("late".to_string()), SqlValue::String);
        filter.push_opt("e.department = ?", None::<String>, SqlValue::String);

        assert_eq!(filter.where_clause(), "WHERE a.employee_id = ? AND a.status = ?");
        assert_eq!(filter.values.len(), 2);

        filter.push_group(
            "(e.first_name LIKE ? OR e.last_name LIKE ?)",
            vec![SqlValue::String("%a%".into()); 2],
        );
        assert!(filter.where_clause().ends_with("AND (e.first_name LIKE ? OR e.last_name LIKE ?)"));
        assert_eq!(filter.values.len(), 4);
    }
}
