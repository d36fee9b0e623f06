//! PostgreSQL store for bindings, product images, checkpoints and stock.
//!
//! # Testing
//!
//! Tests only cover row conversions. The queries themselves need a live
//! PostgreSQL instance and are exercised through the CLI.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use prestalink_core::error::AppError;
use prestalink_core::jobs::Job;
use prestalink_core::models::{
    BackendId, Binding, Checkpoint, FieldSet, LocalId, LocalRecord, Model, RecordRef, RemoteId,
    UpsertOutcome,
};
use prestalink_core::ports::{
    BindingStore, CheckpointSink, JobQueue, ProductBindingStore, RecordStore, StockStore,
};
use prestalink_core::product_image::ImageAttachment;
use prestalink_core::stock::{
    InventoryId, LocationId, MoveId, MoveState, Picking, PickingId, ProductBinding, ProductId,
    StockMove, StockMoveWrite,
};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

const BINDING_COLUMNS: &str = "id, backend_id, model, remote_id, local_id";

const MOVE_COLUMNS: &str = "id, product_id, product_qty, state, location_id, location_dest_id";

/// Storage for every port the importer and stock rules need.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use prestalink_db::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/prestalink")
///     .await?;
///
/// let store = PgStore::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent checkpoints first.
    pub async fn list_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>, AppError> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            r#"
            SELECT id, backend_id, record_model, record_id, message, created_at
            FROM checkpoints
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(Checkpoint::try_from).collect()
    }
}

/// Table holding the records of a model.
fn record_table(model: Model) -> &'static str {
    match model {
        Model::ProductTemplate => "product_templates",
        Model::ProductImage => "product_images",
        Model::SaleOrder => "sale_orders",
    }
}

impl BindingStore for PgStore {
    async fn find_binding(
        &self,
        backend_id: BackendId,
        model: Model,
        remote_id: RemoteId,
    ) -> Result<Option<Binding>, AppError> {
        let query = format!(
            "SELECT {} FROM bindings WHERE backend_id = $1 AND model = $2 AND remote_id = $3",
            BINDING_COLUMNS
        );
        let row: Option<BindingRow> = sqlx::query_as(&query)
            .bind(backend_id)
            .bind(model.as_str())
            .bind(remote_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        row.map(Binding::try_from).transpose()
    }

    async fn load_record(&self, model: Model, id: LocalId) -> Result<Option<LocalRecord>, AppError> {
        let query = format!("SELECT id, name FROM {} WHERE id = $1", record_table(model));
        let row: Option<(i64, String)> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(row.map(|(id, name)| LocalRecord { model, id, name }))
    }

    async fn record_bindings(&self, model: Model, id: LocalId) -> Result<Vec<Binding>, AppError> {
        let query = format!(
            "SELECT {} FROM bindings WHERE model = $1 AND local_id = $2 ORDER BY id",
            BINDING_COLUMNS
        );
        let rows: Vec<BindingRow> = sqlx::query_as(&query)
            .bind(model.as_str())
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(Binding::try_from).collect()
    }
}

impl RecordStore for PgStore {
    /// Upserts a product image and its binding in one transaction.
    ///
    /// A transaction-scoped advisory lock on (backend, model, remote id) is
    /// taken first, so concurrent imports of the same remote record run one
    /// after the other even when no binding row exists yet.
    async fn upsert_bound(
        &self,
        backend_id: BackendId,
        model: Model,
        remote_id: RemoteId,
        fields: &FieldSet,
    ) -> Result<UpsertOutcome, AppError> {
        if model != Model::ProductImage {
            return Err(AppError::UnsupportedModel(model));
        }
        let image = ImageAttachment::try_from(fields)?;

        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(binding_lock_key(backend_id, model, remote_id))
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

        let existing: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, local_id FROM bindings
            WHERE backend_id = $1 AND model = $2 AND remote_id = $3
            FOR UPDATE
            "#,
        )
        .bind(backend_id)
        .bind(model.as_str())
        .bind(remote_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;

        if let Some((binding_id, local_id)) = existing {
            let updated = sqlx::query(
                r#"
                UPDATE product_images SET
                    owner_id = $2,
                    owner_model = $3,
                    name = $4,
                    extension = $5,
                    url = $6,
                    file_db_store = $7,
                    filename = $8,
                    storage = $9,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(local_id)
            .bind(image.owner_id)
            .bind(&image.owner_model)
            .bind(&image.name)
            .bind(&image.extension)
            .bind(&image.url)
            .bind(&image.file_db_store)
            .bind(&image.filename)
            .bind(&image.storage)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

            if updated.rows_affected() > 0 {
                tx.commit().await.map_err(AppError::DatabaseError)?;
                return Ok(UpsertOutcome::Updated(local_id));
            }

            // Binding outlived its image: recreate the image and repoint.
            let new_id = insert_image(&mut tx, &image).await?;
            sqlx::query("UPDATE bindings SET local_id = $2 WHERE id = $1")
                .bind(binding_id)
                .bind(new_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::DatabaseError)?;
            tx.commit().await.map_err(AppError::DatabaseError)?;
            debug!("Recreated image {} for stale binding {}", new_id, binding_id);
            return Ok(UpsertOutcome::Created(new_id));
        }

        let new_id = insert_image(&mut tx, &image).await?;
        sqlx::query(
            r#"
            INSERT INTO bindings (backend_id, model, remote_id, local_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(backend_id)
        .bind(model.as_str())
        .bind(remote_id.0)
        .bind(new_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;
        tx.commit().await.map_err(AppError::DatabaseError)?;

        Ok(UpsertOutcome::Created(new_id))
    }
}

/// Advisory lock key of one binding triple.
fn binding_lock_key(backend_id: BackendId, model: Model, remote_id: RemoteId) -> String {
    format!("bindings:{}:{}:{}", backend_id, model.as_str(), remote_id)
}

/// Rejects written values that have no `stock_moves` column.
fn ensure_stock_columns(vals: &StockMoveWrite) -> Result<(), AppError> {
    match vals.extra.keys().next() {
        Some(field) => Err(AppError::InvalidField {
            field: field.clone(),
            reason: "not a stock move column".to_string(),
        }),
        None => Ok(()),
    }
}

async fn insert_image(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    image: &ImageAttachment,
) -> Result<LocalId, AppError> {
    let rec: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO product_images (
            owner_id,
            owner_model,
            name,
            extension,
            url,
            file_db_store,
            filename,
            storage
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(image.owner_id)
    .bind(&image.owner_model)
    .bind(&image.name)
    .bind(&image.extension)
    .bind(&image.url)
    .bind(&image.file_db_store)
    .bind(&image.filename)
    .bind(&image.storage)
    .fetch_one(&mut **tx)
    .await
    .map_err(AppError::DatabaseError)?;

    Ok(rec.0)
}

impl CheckpointSink for PgStore {
    async fn add_checkpoint(
        &self,
        backend_id: BackendId,
        record: Option<RecordRef>,
        message: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (backend_id, record_model, record_id, message)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(backend_id)
        .bind(record.map(|r| r.model.as_str()))
        .bind(record.map(|r| r.id))
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

impl JobQueue for PgStore {
    async fn enqueue(&self, job: Job) -> Result<Uuid, AppError> {
        let uuid = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO queue_jobs (uuid, kind, backend_id, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(uuid)
        .bind(job.kind())
        .bind(job.backend_id())
        .bind(Json(&job))
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(uuid)
    }
}

impl StockStore for PgStore {
    async fn synchronized_locations(&self) -> Result<HashSet<LocationId>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM stock_locations WHERE usage = 'internal' AND synchronized",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn read_moves(&self, ids: &[MoveId]) -> Result<Vec<StockMove>, AppError> {
        let query = format!(
            "SELECT {} FROM stock_moves WHERE id = ANY($1) ORDER BY id",
            MOVE_COLUMNS
        );
        let rows: Vec<MoveRow> = sqlx::query_as(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(StockMove::try_from).collect()
    }

    async fn write_moves(&self, ids: &[MoveId], vals: &StockMoveWrite) -> Result<(), AppError> {
        ensure_stock_columns(vals)?;
        sqlx::query(
            r#"
            UPDATE stock_moves SET
                state = COALESCE($2, state),
                product_qty = COALESCE($3, product_qty),
                location_id = COALESCE($4, location_id),
                location_dest_id = COALESCE($5, location_dest_id)
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(vals.state.map(|s| s.as_str()))
        .bind(vals.product_qty)
        .bind(vals.location_id)
        .bind(vals.location_dest_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn product_quantity(
        &self,
        product_id: ProductId,
        locations: &HashSet<LocationId>,
    ) -> Result<f64, AppError> {
        let locations: Vec<i64> = locations.iter().copied().collect();
        let row: (f64,) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN location_dest_id = ANY($2) THEN product_qty ELSE 0 END), 0)
                - COALESCE(SUM(CASE WHEN location_id = ANY($2) THEN product_qty ELSE 0 END), 0)
            FROM stock_moves
            WHERE product_id = $1 AND state = 'done'
            "#,
        )
        .bind(product_id)
        .bind(&locations)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.0)
    }

    async fn inventory_moves(&self, inventory_id: InventoryId) -> Result<Vec<StockMove>, AppError> {
        let query = format!(
            "SELECT {} FROM stock_moves WHERE inventory_id = $1 ORDER BY id",
            MOVE_COLUMNS
        );
        let rows: Vec<MoveRow> = sqlx::query_as(&query)
            .bind(inventory_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(StockMove::try_from).collect()
    }

    async fn set_inventory_done(&self, inventory_id: InventoryId) -> Result<(), AppError> {
        sqlx::query("UPDATE stock_inventories SET state = 'done' WHERE id = $1")
            .bind(inventory_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn load_picking(&self, picking_id: PickingId) -> Result<Option<Picking>, AppError> {
        let row: Option<PickingRow> = sqlx::query_as(
            "SELECT id, sale_id, carrier_tracking_ref FROM stock_pickings WHERE id = $1",
        )
        .bind(picking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(Picking::from))
    }
}

impl ProductBindingStore for PgStore {
    async fn product_bindings(&self, product_id: ProductId) -> Result<Vec<ProductBinding>, AppError> {
        let rows: Vec<ProductBindingRow> = sqlx::query_as(
            r#"
            SELECT id, backend_id, remote_id, quantity
            FROM product_bindings
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(ProductBinding::from).collect())
    }

    async fn set_binding_quantity(&self, binding_id: LocalId, quantity: f64) -> Result<(), AppError> {
        sqlx::query("UPDATE product_bindings SET quantity = $2 WHERE id = $1")
            .bind(binding_id)
            .bind(quantity)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

/// Helper struct for deserializing binding rows
#[derive(sqlx::FromRow)]
struct BindingRow {
    id: i64,
    backend_id: i64,
    model: String,
    remote_id: i64,
    local_id: i64,
}

impl TryFrom<BindingRow> for Binding {
    type Error = AppError;

    fn try_from(row: BindingRow) -> Result<Self, Self::Error> {
        Ok(Binding {
            id: row.id,
            backend_id: row.backend_id,
            model: row.model.parse()?,
            remote_id: RemoteId(row.remote_id),
            local_id: row.local_id,
        })
    }
}

/// Helper struct for deserializing stock move rows
#[derive(sqlx::FromRow)]
struct MoveRow {
    id: i64,
    product_id: i64,
    product_qty: f64,
    state: String,
    location_id: i64,
    location_dest_id: i64,
}

impl TryFrom<MoveRow> for StockMove {
    type Error = AppError;

    fn try_from(row: MoveRow) -> Result<Self, Self::Error> {
        Ok(StockMove {
            id: row.id,
            product_id: row.product_id,
            product_qty: row.product_qty,
            state: row.state.parse::<MoveState>()?,
            location_id: row.location_id,
            location_dest_id: row.location_dest_id,
        })
    }
}

/// Helper struct for deserializing checkpoint rows
#[derive(sqlx::FromRow)]
struct CheckpointRow {
    id: i64,
    backend_id: i64,
    record_model: Option<String>,
    record_id: Option<i64>,
    message: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = AppError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let record = match (row.record_model, row.record_id) {
            (Some(model), Some(id)) => Some(RecordRef {
                model: model.parse()?,
                id,
            }),
            _ => None,
        };
        Ok(Checkpoint {
            id: row.id,
            backend_id: row.backend_id,
            record,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PickingRow {
    id: i64,
    sale_id: Option<i64>,
    carrier_tracking_ref: Option<String>,
}

impl From<PickingRow> for Picking {
    fn from(row: PickingRow) -> Self {
        Picking {
            id: row.id,
            sale_id: row.sale_id,
            carrier_tracking_ref: row.carrier_tracking_ref,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductBindingRow {
    id: i64,
    backend_id: i64,
    remote_id: i64,
    quantity: Option<f64>,
}

impl From<ProductBindingRow> for ProductBinding {
    fn from(row: ProductBindingRow) -> Self {
        ProductBinding {
            id: row.id,
            backend_id: row.backend_id,
            remote_id: RemoteId(row.remote_id),
            quantity: row.quantity,
        }
    }
}
