//! Abstracts over the three pooled drivers behind one async trait so the
//! executor never branches on dialect except to pick a [`Visitor`]. Each
//! backend lives behind its Cargo feature (mirrors the teacher's pattern of
//! feature-gating an entire driver module rather than gating individual
//! call sites).

use async_trait::async_trait;
use quaint::ast::Value as SqlValue;
use quaint::dialect::Dialect;
use query_connector::ConnectorError;
use query_structure::ColumnType;

/// What shape to decode a result column into. Scalar columns decode
/// through the driver's native typed getters against the declared logical
/// type; relation columns are always rendered as a JSON/text blob by the
/// query itself (`JSON_OBJECT`/`JSON_ARRAYAGG`) and are decoded as raw text
/// then parsed by the normaliser.
#[derive(Debug, Clone)]
pub enum ColumnHint {
    Scalar(ColumnType),
    Json,
}

/// A backend-independent, already-decoded row value. Distinct from
/// [`query_structure::Value`] because that type additionally carries
/// `Record`/`List`/`Enum` shapes the normaliser only produces after
/// consulting metadata; at the wire-decode layer we only know what the
/// driver gave us.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One decoded row, in the same column order the query was built with.
#[derive(Debug, Clone, Default)]
pub struct SqlRow(pub Vec<RawValue>);

impl SqlRow {
    pub fn get(&self, index: usize) -> Option<&RawValue> {
        self.0.get(index)
    }
}

#[async_trait]
pub trait SqlConnection: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Runs a parameterised query, decoding each result column according to
    /// `hints` (positional, matching the query's column list).
    async fn query(&self, sql: &str, params: Vec<SqlValue>, hints: &[ColumnHint]) -> Result<Vec<SqlRow>, ConnectorError>;

    /// Runs a query expected to return a single row with a single bigint
    /// column (`COUNT(*)`-shaped queries).
    async fn query_scalar_count(&self, sql: &str, params: Vec<SqlValue>) -> Result<i64, ConnectorError> {
        let rows = self.query(sql, params, &[ColumnHint::Scalar(ColumnType::BigInt)]).await?;
        match rows.first().and_then(|r| r.get(0)) {
            Some(RawValue::Int(n)) => Ok(*n),
            Some(RawValue::Null) | None => Ok(0),
            other => Err(ConnectorError::internal(format!("expected a single count column, got {other:?}"))),
        }
    }
}

#[cfg(feature = "mysql")]
pub mod mysql {
    use super::*;
    use mysql_async::prelude::Queryable as _;
    use mysql_async::{Conn, Value as MyValue};

    pub struct MysqlConnection {
        conn: tokio::sync::Mutex<Conn>,
    }

    impl MysqlConnection {
        pub fn new(conn: Conn) -> Self {
            Self { conn: tokio::sync::Mutex::new(conn) }
        }
    }

    fn to_mysql_value(value: SqlValue) -> MyValue {
        match value {
            SqlValue::Null => MyValue::NULL,
            SqlValue::Int32(v) => MyValue::Int(v as i64),
            SqlValue::Int64(v) => MyValue::Int(v),
            SqlValue::Text(v) => MyValue::Bytes(v.into_bytes()),
            SqlValue::Boolean(v) => MyValue::Int(v as i64),
            SqlValue::Double(v) => MyValue::Double(v),
            SqlValue::Numeric(v) => MyValue::Bytes(v.to_string().into_bytes()),
            SqlValue::Json(v) => MyValue::Bytes(v.to_string().into_bytes()),
            SqlValue::Uuid(v) => MyValue::Bytes(v.to_string().into_bytes()),
            SqlValue::Date(v) => MyValue::Bytes(v.format("%Y-%m-%d").to_string().into_bytes()),
            SqlValue::DateTime(v) => MyValue::Bytes(v.to_rfc3339().into_bytes()),
            SqlValue::Array(_) => MyValue::NULL,
        }
    }

    fn from_mysql_value(value: MyValue, hint: &ColumnHint) -> RawValue {
        match value {
            MyValue::NULL => RawValue::Null,
            MyValue::Bytes(bytes) => match hint {
                ColumnHint::Scalar(ColumnType::Boolean) => RawValue::Bool(bytes.first().map(|b| *b != 0).unwrap_or(false)),
                _ => RawValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
            },
            MyValue::Int(v) => match hint {
                ColumnHint::Scalar(ColumnType::Boolean) => RawValue::Bool(v != 0),
                _ => RawValue::Int(v),
            },
            MyValue::UInt(v) => RawValue::Int(v as i64),
            MyValue::Float(v) => RawValue::Float(v as f64),
            MyValue::Double(v) => RawValue::Float(v),
            MyValue::Date(y, mo, d, h, mi, s, micro) => {
                RawValue::Text(format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{micro:06}Z"))
            }
            MyValue::Time(neg, days, h, mi, s, micro) => {
                RawValue::Text(format!("{}{days}d{h:02}:{mi:02}:{s:02}.{micro:06}", if neg { "-" } else { "" }))
            }
        }
    }

    #[async_trait]
    impl SqlConnection for MysqlConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Mysql
        }

        async fn query(&self, sql: &str, params: Vec<SqlValue>, hints: &[ColumnHint]) -> Result<Vec<SqlRow>, ConnectorError> {
            let mut conn = self.conn.lock().await;
            let mysql_params: Vec<MyValue> = params.into_iter().map(to_mysql_value).collect();
            let rows: Vec<mysql_async::Row> = conn
                .exec(sql, mysql_params)
                .await
                .map_err(|e| ConnectorError::TransportError(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|mut row| {
                    let mut values = Vec::with_capacity(row.len());
                    for i in 0..row.len() {
                        let hint = hints.get(i).cloned().unwrap_or(ColumnHint::Json);
                        let value = row.take(i).unwrap_or(MyValue::NULL);
                        values.push(from_mysql_value(value, &hint));
                    }
                    SqlRow(values)
                })
                .collect())
        }
    }
}

#[cfg(feature = "postgresql")]
pub mod postgres {
    use super::*;
    use tokio_postgres::types::{ToSql, Type};
    use tokio_postgres::Client;

    pub struct PostgresConnection {
        client: Client,
    }

    impl PostgresConnection {
        pub fn new(client: Client) -> Self {
            Self { client }
        }
    }

    fn to_sql_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
        match value {
            SqlValue::Null => Box::new(Option::<i32>::None),
            SqlValue::Int32(v) => Box::new(*v),
            SqlValue::Int64(v) => Box::new(*v),
            SqlValue::Text(v) => Box::new(v.clone()),
            SqlValue::Boolean(v) => Box::new(*v),
            SqlValue::Double(v) => Box::new(*v),
            SqlValue::Numeric(v) => Box::new(v.to_string()),
            SqlValue::Json(v) => Box::new(v.clone()),
            SqlValue::Uuid(v) => Box::new(*v),
            SqlValue::Date(v) => Box::new(*v),
            SqlValue::DateTime(v) => Box::new(*v),
            SqlValue::Array(_) => Box::new(Option::<i32>::None),
        }
    }

    fn from_row(row: &tokio_postgres::Row, index: usize, hint: &ColumnHint) -> RawValue {
        let col_type = row.columns()[index].type_();
        match hint {
            ColumnHint::Scalar(ColumnType::Boolean) => row.get::<_, Option<bool>>(index).map(RawValue::Bool).unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::Integer) => row.get::<_, Option<i32>>(index).map(|v| RawValue::Int(v as i64)).unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::BigInt) => row.get::<_, Option<i64>>(index).map(RawValue::Int).unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::Float) => row.get::<_, Option<f64>>(index).map(RawValue::Float).unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::Decimal) => row.get::<_, Option<String>>(index).map(RawValue::Text).unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::Uuid) => row
                .get::<_, Option<uuid::Uuid>>(index)
                .map(|v| RawValue::Text(v.to_string()))
                .unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::Date) => row
                .get::<_, Option<chrono::NaiveDate>>(index)
                .map(|v| RawValue::Text(v.format("%Y-%m-%d").to_string()))
                .unwrap_or(RawValue::Null),
            ColumnHint::Scalar(ColumnType::DateTime) | ColumnHint::Scalar(ColumnType::Timestamp) => row
                .get::<_, Option<chrono::DateTime<chrono::Utc>>>(index)
                .map(|v| RawValue::Text(v.to_rfc3339()))
                .unwrap_or(RawValue::Null),
            ColumnHint::Json | ColumnHint::Scalar(ColumnType::Json) | ColumnHint::Scalar(ColumnType::Enum { .. }) | ColumnHint::Scalar(ColumnType::Text) => {
                if *col_type == Type::JSON || *col_type == Type::JSONB {
                    row.get::<_, Option<serde_json::Value>>(index).map(|v| RawValue::Text(v.to_string())).unwrap_or(RawValue::Null)
                } else {
                    row.get::<_, Option<String>>(index).map(RawValue::Text).unwrap_or(RawValue::Null)
                }
            }
        }
    }

    #[async_trait]
    impl SqlConnection for PostgresConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn query(&self, sql: &str, params: Vec<SqlValue>, hints: &[ColumnHint]) -> Result<Vec<SqlRow>, ConnectorError> {
            let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(to_sql_param).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();

            let rows = self
                .client
                .query(sql, &refs)
                .await
                .map_err(|e| ConnectorError::TransportError(e.to_string()))?;

            Ok(rows
                .iter()
                .map(|row| {
                    let values = (0..row.len())
                        .map(|i| {
                            let hint = hints.get(i).cloned().unwrap_or(ColumnHint::Json);
                            from_row(row, i, &hint)
                        })
                        .collect();
                    SqlRow(values)
                })
                .collect())
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use super::*;
    use rusqlite::types::{Value as LiteValue, ValueRef};
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    pub struct SqliteConnection {
        conn: Arc<Mutex<Connection>>,
    }

    impl SqliteConnection {
        pub fn new(conn: Connection) -> Self {
            Self { conn: Arc::new(Mutex::new(conn)) }
        }
    }

    fn to_lite_value(value: SqlValue) -> LiteValue {
        match value {
            SqlValue::Null => LiteValue::Null,
            SqlValue::Int32(v) => LiteValue::Integer(v as i64),
            SqlValue::Int64(v) => LiteValue::Integer(v),
            SqlValue::Text(v) => LiteValue::Text(v),
            SqlValue::Boolean(v) => LiteValue::Integer(v as i64),
            SqlValue::Double(v) => LiteValue::Real(v),
            SqlValue::Numeric(v) => LiteValue::Text(v.to_string()),
            SqlValue::Json(v) => LiteValue::Text(v.to_string()),
            SqlValue::Uuid(v) => LiteValue::Text(v.to_string()),
            SqlValue::Date(v) => LiteValue::Text(v.format("%Y-%m-%d").to_string()),
            SqlValue::DateTime(v) => LiteValue::Text(v.to_rfc3339()),
            SqlValue::Array(_) => LiteValue::Null,
        }
    }

    fn from_value_ref(value: ValueRef<'_>, hint: &ColumnHint) -> RawValue {
        match value {
            ValueRef::Null => RawValue::Null,
            ValueRef::Integer(v) => match hint {
                ColumnHint::Scalar(ColumnType::Boolean) => RawValue::Bool(v != 0),
                _ => RawValue::Int(v),
            },
            ValueRef::Real(v) => RawValue::Float(v),
            ValueRef::Text(bytes) => RawValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => RawValue::Bytes(bytes.to_vec()),
        }
    }

    #[async_trait]
    impl SqlConnection for SqliteConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn query(&self, sql: &str, params: Vec<SqlValue>, hints: &[ColumnHint]) -> Result<Vec<SqlRow>, ConnectorError> {
            let conn = self.conn.clone();
            let sql = sql.to_string();
            let hints = hints.to_vec();

            tokio::task::spawn_blocking(move || -> Result<Vec<SqlRow>, ConnectorError> {
                let guard = conn.lock().map_err(|_| ConnectorError::internal("sqlite connection mutex poisoned"))?;
                let mut stmt = guard
                    .prepare(&sql)
                    .map_err(|e| ConnectorError::QueryError(e.to_string()))?;
                let lite_params: Vec<LiteValue> = params.into_iter().map(to_lite_value).collect();
                let column_count = stmt.column_count();

                let rows = stmt
                    .query_map(rusqlite::params_from_iter(lite_params.iter()), |row| {
                        let mut values = Vec::with_capacity(column_count);
                        for i in 0..column_count {
                            let hint = hints.get(i).cloned().unwrap_or(ColumnHint::Json);
                            values.push(from_value_ref(row.get_ref(i)?, &hint));
                        }
                        Ok(SqlRow(values))
                    })
                    .map_err(|e| ConnectorError::QueryError(e.to_string()))?;

                rows.collect::<Result<Vec<_>, _>>().map_err(|e| ConnectorError::QueryError(e.to_string()))
            })
            .await
            .map_err(|e| ConnectorError::internal(format!("sqlite worker thread panicked: {e}")))?
        }
    }
}

#[cfg(test)]
pub mod fixture {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory stand-in used by executor/postfetch tests: returns a
    /// fixed sequence of row batches, one per call to `query`, in order.
    /// Captures the SQL text of every call for assertions on what the
    /// planner actually produced.
    pub struct FixtureConnection {
        dialect: Dialect,
        responses: Mutex<std::collections::VecDeque<Vec<SqlRow>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FixtureConnection {
        pub fn new(dialect: Dialect, responses: Vec<Vec<SqlRow>>) -> Self {
            Self {
                dialect,
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SqlConnection for FixtureConnection {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn query(&self, sql: &str, _params: Vec<SqlValue>, _hints: &[ColumnHint]) -> Result<Vec<SqlRow>, ConnectorError> {
            self.calls.lock().unwrap().push(sql.to_string());
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }
    }
}
