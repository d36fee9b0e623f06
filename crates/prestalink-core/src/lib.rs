//! Prestalink Core - Domain types, import pipeline and stock propagation.

pub mod binder;
pub mod config;
pub mod error;
pub mod importer;
pub mod jobs;
pub mod listener;
pub mod mapper;
pub mod models;
pub mod ports;
pub mod product_image;
pub mod quantity;
pub mod stock;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use binder::{Binder, Internal};
pub use config::{
    default_config_path, load_backends_config, BackendEntry, BackendsConfig, DbConfig,
    HttpConfig, ImportConfig,
};
pub use error::AppError;
pub use importer::{import_pipeline, ImportOutcome, ProductImageImporter};
pub use jobs::Job;
pub use listener::PickingListener;
pub use mapper::{MapContext, Mapper, MappingRule};
pub use models::{
    Backend, Binding, Checkpoint, FieldSet, FieldValue, ImageImportType, LocalRecord, Model,
    RecordRef, RemoteId, RemoteRecord, UpsertOutcome,
};
pub use product_image::{
    product_image_mapper, ImageAttachment, ImageVariant, ResizedImages, ThumbnailResizer,
};
pub use quantity::QuantityExporter;
pub use stock::{
    MoveState, Picking, ProductBinding, StockMove, StockMoveWrite, StockPropagator, WriteContext,
};
pub use sync::ImportStats;
