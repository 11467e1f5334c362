pub mod user;

use serde_json::Value;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::task;
use tokio_postgres::{
    types::{ToSql, Type},
    NoTls, Row,
};
use tracing::{debug, error, warn};

pub use tokio_postgres::Error;

pub use self::user::User;

/// Statement parameters, as `tokio_postgres` takes them.
pub type Params<'a> = [&'a (dyn ToSql + Sync)];

/// One result row: column names paired with their values, in result order.
pub type Record = Vec<(String, Value)>;

/// What a statement produced.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Rows(Vec<Record>),
    Affected(u64),
}

/// Single lazily opened connection.
///
/// Nothing is pooled: a request opens its own `Database`, runs its
/// statements and calls [`Database::disconnect`].
pub struct Database {
    config: tokio_postgres::Config,
    client: Option<tokio_postgres::Client>,
}

impl Database {
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub async fn connect(
        &mut self,
    ) -> Result<&mut tokio_postgres::Client, Error> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                task::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("database connection failed: {e}");
                    }
                });
                debug!("database connection opened");
                client
            }
        };
        Ok(self.client.insert(client))
    }

    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            debug!("database connection closed");
        }
    }

    /// Runs `sql` in its own transaction and returns every row.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &Params<'_>,
    ) -> Result<Vec<Row>, Error> {
        let tx = self.connect().await?.transaction().await?;
        match tx.query(sql, params).await {
            Ok(rows) => {
                tx.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                error!("database query failed: {e}");
                if let Err(e) = tx.rollback().await {
                    warn!("rollback failed: {e}");
                }
                Err(e)
            }
        }
    }

    /// Runs `sql` in its own transaction and returns the affected row count.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &Params<'_>,
    ) -> Result<u64, Error> {
        let tx = self.connect().await?.transaction().await?;
        match tx.execute(sql, params).await {
            Ok(affected) => {
                tx.commit().await?;
                Ok(affected)
            }
            Err(e) => {
                error!("database statement failed: {e}");
                if let Err(e) = tx.rollback().await {
                    warn!("rollback failed: {e}");
                }
                Err(e)
            }
        }
    }

    /// Runs any statement, returning rows for `SELECT` and `RETURNING`
    /// statements and the affected row count for everything else.
    pub async fn execute_query(
        &mut self,
        sql: &str,
        params: &Params<'_>,
    ) -> Result<Outcome, Error> {
        if returns_rows(sql) {
            let rows = self.query(sql, params).await?;
            let records = rows
                .iter()
                .map(record)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Outcome::Rows(records))
        } else {
            self.execute(sql, params).await.map(Outcome::Affected)
        }
    }
}

/// Whether `sql` yields a result set.
pub fn returns_rows(sql: &str) -> bool {
    let mut words = sql.split_whitespace();
    let starts_with_select = words
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("SELECT"));
    starts_with_select
        || words.any(|word| word.eq_ignore_ascii_case("RETURNING"))
}

fn record(row: &Row) -> Result<Record, Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = value(row, idx, column.type_())?;
            Ok::<_, Error>((column.name().to_string(), value))
        })
        .collect()
}

fn value(row: &Row, idx: usize, ty: &Type) -> Result<Value, Error> {
    Ok(match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.into(),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.into(),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.into(),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.into(),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.into(),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.into(),
        "json" | "jsonb" => {
            row.try_get::<_, Option<Value>>(idx)?.unwrap_or(Value::Null)
        }
        "timestamptz" => row
            .try_get::<_, Option<OffsetDateTime>>(idx)?
            .map(|t| t.to_string())
            .into(),
        "timestamp" => row
            .try_get::<_, Option<PrimitiveDateTime>>(idx)?
            .map(|t| t.to_string())
            .into(),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.into(),
            Err(e) => {
                warn!("unsupported column type {}: {e}", ty.name());
                Value::Null
            }
        },
    })
}
