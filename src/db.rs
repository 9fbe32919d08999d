//! PostgreSQL pool, schema and batched upserts.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};

use crate::config::DbSettings;
use crate::error::AppError;
use crate::models::{Employer, Vacancy};

/// Tables that may be truncated. Nothing outside this list is ever wiped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Employers,
    Vacancies,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::Employers, Table::Vacancies];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Employers => "employers",
            Table::Vacancies => "vacancies",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "employers" => Ok(Table::Employers),
            "vacancies" => Ok(Table::Vacancies),
            _ => Err(AppError::UnknownTable(s.to_string())),
        }
    }
}

/// Build a bounded pool. `acquire` waits up to `acquire_timeout` for a free
/// connection and then fails; connections go back to the pool on drop.
pub async fn create_pool(settings: &DbSettings) -> Result<PgPool, AppError> {
    let options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.name)
        .options([(
            "statement_timeout",
            settings.statement_timeout.as_millis().to_string(),
        )]);

    let pool = PgPoolOptions::new()
        .max_connections(settings.pool_size)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create tables, constraints and indexes when absent. Safe on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn has_data(pool: &PgPool) -> Result<bool, AppError> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM employers)")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Truncate the given tables. Truncating employers cascades to vacancies.
pub async fn clear(pool: &PgPool, tables: &[Table]) -> Result<(), AppError> {
    let mut names: Vec<&'static str> = Vec::new();
    for table in tables {
        if !names.contains(&table.as_str()) {
            names.push(table.as_str());
        }
    }
    if names.is_empty() {
        return Ok(());
    }

    let statement = format!("TRUNCATE {} CASCADE", names.join(", "));
    let mut tx = pool.begin().await?;
    sqlx::query(&statement).execute(&mut *tx).await?;
    tx.commit().await?;

    tracing::warn!(tables = %names.join(", "), "Tables truncated");
    Ok(())
}

/// A record type that can be written in multi-row chunks keyed by its
/// external identifier.
#[async_trait]
pub trait Upsert: Clone + Send + Sync {
    const TABLE: Table;

    fn key(&self) -> &str;

    async fn upsert_chunk(conn: &mut PgConnection, chunk: &[Self]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl Upsert for Employer {
    const TABLE: Table = Table::Employers;

    fn key(&self) -> &str {
        &self.employer_id
    }

    async fn upsert_chunk(conn: &mut PgConnection, chunk: &[Self]) -> Result<u64, sqlx::Error> {
        Employer::write_chunk(conn, chunk).await
    }
}

#[async_trait]
impl Upsert for Vacancy {
    const TABLE: Table = Table::Vacancies;

    fn key(&self) -> &str {
        &self.vacancy_id
    }

    async fn upsert_chunk(conn: &mut PgConnection, chunk: &[Self]) -> Result<u64, sqlx::Error> {
        Vacancy::write_chunk(conn, chunk).await
    }
}

pub async fn upsert_employers(
    pool: &PgPool,
    employers: &[Employer],
    batch_size: usize,
) -> Result<u64, AppError> {
    upsert_all(pool, employers, batch_size).await
}

pub async fn upsert_vacancies(
    pool: &PgPool,
    vacancies: &[Vacancy],
    batch_size: usize,
) -> Result<u64, AppError> {
    upsert_all(pool, vacancies, batch_size).await
}

/// Write records in chunks of `batch_size`, one transaction per chunk.
/// A failing chunk is rolled back and its error returned; earlier chunks
/// stay committed.
async fn upsert_all<T: Upsert>(
    pool: &PgPool,
    records: &[T],
    batch_size: usize,
) -> Result<u64, AppError> {
    let records = latest_per_key(records);
    let mut written = 0u64;

    for (index, chunk) in records.chunks(batch_size.max(1)).enumerate() {
        let mut tx = pool.begin().await?;
        match T::upsert_chunk(&mut *tx, chunk).await {
            Ok(rows) => {
                tx.commit().await?;
                written += rows;
                tracing::debug!(table = %T::TABLE, chunk = index, rows, "Chunk committed");
            }
            Err(e) => {
                let err = AppError::from(e);
                tracing::error!(
                    table = %T::TABLE,
                    chunk = index,
                    first_id = chunk.first().map(|r| r.key()).unwrap_or_default(),
                    constraint = err.is_constraint_violation(),
                    "Chunk rolled back: {err}"
                );
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(table = %T::TABLE, chunk = index, "Rollback failed: {rollback}");
                }
                return Err(err);
            }
        }
    }

    tracing::info!(table = %T::TABLE, rows = written, "Upsert complete");
    Ok(written)
}

/// Collapse duplicate keys (last occurrence wins, first position kept);
/// Postgres refuses to update the same row twice in one statement.
fn latest_per_key<T: Upsert>(records: &[T]) -> Vec<T> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(record.key()) {
            Some(&i) => unique[i] = record.clone(),
            None => {
                position.insert(record.key(), unique.len());
                unique.push(record.clone());
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employer(id: &str, name: &str) -> Employer {
        Employer {
            employer_id: id.to_string(),
            name: name.to_string(),
            url: format!("https://hh.ru/employer/{id}"),
            open_vacancies: 0,
            description: None,
            area: None,
        }
    }

    #[test]
    fn table_names_are_allow_listed() {
        assert_eq!("employers".parse::<Table>().unwrap(), Table::Employers);
        assert_eq!(" Vacancies ".parse::<Table>().unwrap(), Table::Vacancies);
        assert!(matches!(
            "users; DROP TABLE employers".parse::<Table>(),
            Err(AppError::UnknownTable(_))
        ));
    }

    #[test]
    fn duplicates_keep_the_latest_record() {
        let records = vec![
            employer("1740", "Yandex"),
            employer("3529", "Sber"),
            employer("1740", "Яндекс"),
        ];
        let unique = latest_per_key(&records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "Яндекс");
        assert_eq!(unique[1].employer_id, "3529");
    }
}
