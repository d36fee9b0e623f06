//! Collaborator interfaces consumed by the importer and the stock rules.
//!
//! The core never talks to HTTP or SQL directly. `prestalink-client` and
//! `prestalink-db` provide the production implementations; tests use in-memory fakes.

// Callers are single-task; the returned futures need not be `Send`.
#![allow(async_fn_in_trait)]

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::jobs::Job;
use crate::models::{
    BackendId, Binding, FieldSet, LocalId, LocalRecord, Model, RecordRef, RemoteId, RemoteRecord,
    UpsertOutcome,
};
use crate::product_image::ResizedImages;
use crate::stock::{
    InventoryId, LocationId, MoveId, Picking, PickingId, ProductBinding, ProductId, StockMove,
    StockMoveWrite,
};

/// Reads raw entities from the remote shop.
///
/// One adapter per local entity type. The importer only knows that `read`
/// returns a [`RemoteRecord`] or a transport error.
pub trait RecordAdapter {
    async fn read(&self, parent_id: RemoteId, entity_id: RemoteId)
        -> Result<RemoteRecord, AppError>;
}

/// Read access to bindings and the local records behind them.
pub trait BindingStore {
    async fn find_binding(
        &self,
        backend_id: BackendId,
        model: Model,
        remote_id: RemoteId,
    ) -> Result<Option<Binding>, AppError>;

    async fn load_record(&self, model: Model, id: LocalId)
        -> Result<Option<LocalRecord>, AppError>;

    /// All bindings of a local record, across backends.
    async fn record_bindings(&self, model: Model, id: LocalId)
        -> Result<Vec<Binding>, AppError>;
}

/// Persists mapped records.
pub trait RecordStore {
    /// Creates or updates the local record bound to `remote_id`, and creates the
    /// binding if missing. Both writes must commit together.
    async fn upsert_bound(
        &self,
        backend_id: BackendId,
        model: Model,
        remote_id: RemoteId,
        fields: &FieldSet,
    ) -> Result<UpsertOutcome, AppError>;
}

/// Append-only sink of checkpoints. No deduplication.
pub trait CheckpointSink {
    async fn add_checkpoint(
        &self,
        backend_id: BackendId,
        record: Option<RecordRef>,
        message: &str,
    ) -> Result<(), AppError>;
}

/// Produces resized variants of an image payload.
pub trait ImageResizer {
    fn resize(&self, data: &[u8]) -> Result<ResizedImages, AppError>;
}

/// External job queue.
///
/// Delivery is at-least-once and unordered. Jobs may run before the enqueuing
/// operation commits, so payloads carry everything the job needs.
pub trait JobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, AppError>;
}

/// Inventory persistence used by the stock propagation rules.
pub trait StockStore {
    /// Internal locations currently flagged for synchronization.
    async fn synchronized_locations(&self) -> Result<HashSet<LocationId>, AppError>;

    async fn read_moves(&self, ids: &[MoveId]) -> Result<Vec<StockMove>, AppError>;

    async fn write_moves(&self, ids: &[MoveId], vals: &StockMoveWrite) -> Result<(), AppError>;

    /// On-hand quantity of a product over the given locations.
    async fn product_quantity(
        &self,
        product_id: ProductId,
        locations: &HashSet<LocationId>,
    ) -> Result<f64, AppError>;

    async fn inventory_moves(&self, inventory_id: InventoryId)
        -> Result<Vec<StockMove>, AppError>;

    async fn set_inventory_done(&self, inventory_id: InventoryId) -> Result<(), AppError>;

    async fn load_picking(&self, picking_id: PickingId) -> Result<Option<Picking>, AppError>;
}

/// Product bindings carrying the last quantity exported to each shop.
pub trait ProductBindingStore {
    async fn product_bindings(&self, product_id: ProductId)
        -> Result<Vec<ProductBinding>, AppError>;

    async fn set_binding_quantity(&self, binding_id: LocalId, quantity: f64)
        -> Result<(), AppError>;
}

/// Recompute/export entry point triggered by stock changes.
pub trait QuantitySync {
    /// Drops any cached quantity for the product.
    fn invalidate_cache(&self, product_id: ProductId);

    /// Recomputes the product's quantity and schedules its export.
    async fn update_remote_qty(&self, product_id: ProductId) -> Result<(), AppError>;
}
