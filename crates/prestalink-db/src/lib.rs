//! Prestalink DB - PostgreSQL persistence
//!
//! [`PgStore`] implements every storage port of `prestalink-core` on top of
//! a `sqlx` pool. The schema lives in `schema.sql` and is applied with
//! [`apply_schema`].

pub mod repository;

pub use repository::PgStore;

use prestalink_core::error::AppError;
use sqlx::PgPool;

/// Creates missing tables and indexes.
pub async fn apply_schema(pool: &PgPool) -> Result<(), AppError> {
    sqlx::raw_sql(include_str!("schema.sql"))
        .execute(pool)
        .await
        .map_err(AppError::DatabaseError)?;
    Ok(())
}
