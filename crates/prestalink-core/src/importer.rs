//! Import orchestration.
//!
//! [`import_pipeline`] is the generic fetch → map → persist sequence with a
//! pluggable error handler. [`ProductImageImporter`] plugs the product image
//! mapper into it and turns transport failures into checkpoints.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::binder::Binder;
use crate::error::AppError;
use crate::mapper::{MapContext, Mapper};
use crate::models::{Backend, FieldSet, LocalId, Model, RemoteId, RemoteRecord, UpsertOutcome};
use crate::ports::{BindingStore, CheckpointSink, ImageResizer, RecordAdapter, RecordStore};
use crate::product_image::product_image_mapper;

/// Final state of one entity import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// New local record and binding created.
    Created(LocalId),
    /// Existing bound record updated.
    Updated(LocalId),
    /// Import failed and a checkpoint was recorded instead.
    Checkpointed,
}

impl From<UpsertOutcome> for ImportOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created(id) => ImportOutcome::Created(id),
            UpsertOutcome::Updated(id) => ImportOutcome::Updated(id),
        }
    }
}

/// Runs `fetch`, `map` and `persist` in order.
///
/// Any error from the three steps is handed to `on_error`, which either
/// recovers (returning an outcome) or re-raises it.
pub async fn import_pipeline<Fetch, FetchFut, Map, MapFut, Persist, PersistFut, OnError, OnErrorFut>(
    fetch: Fetch,
    map: Map,
    persist: Persist,
    on_error: OnError,
) -> Result<ImportOutcome, AppError>
where
    Fetch: FnOnce() -> FetchFut,
    FetchFut: Future<Output = Result<RemoteRecord, AppError>>,
    Map: FnOnce(RemoteRecord) -> MapFut,
    MapFut: Future<Output = Result<FieldSet, AppError>>,
    Persist: FnOnce(FieldSet) -> PersistFut,
    PersistFut: Future<Output = Result<UpsertOutcome, AppError>>,
    OnError: FnOnce(AppError) -> OnErrorFut,
    OnErrorFut: Future<Output = Result<ImportOutcome, AppError>>,
{
    let attempt = async {
        let record = fetch().await?;
        let fields = map(record).await?;
        persist(fields).await
    };
    match attempt.await {
        Ok(outcome) => Ok(outcome.into()),
        Err(err) => on_error(err).await,
    }
}

/// Imports one image of a product template.
pub struct ProductImageImporter<'a, S, A> {
    backend: &'a Backend,
    store: &'a S,
    adapter: &'a A,
    resizer: &'a dyn ImageResizer,
    mapper: Mapper<S>,
}

impl<'a, S, A> ProductImageImporter<'a, S, A>
where
    S: BindingStore + RecordStore + CheckpointSink,
    A: RecordAdapter,
{
    pub fn new(
        backend: &'a Backend,
        store: &'a S,
        adapter: &'a A,
        resizer: &'a dyn ImageResizer,
    ) -> Result<Self, AppError> {
        Ok(Self {
            backend,
            store,
            adapter,
            resizer,
            mapper: product_image_mapper()?,
        })
    }

    /// Imports image `image_id` of the remote product `template_id`.
    ///
    /// Transport failures are recorded as a checkpoint and reported as
    /// [`ImportOutcome::Checkpointed`]. Every other error is returned.
    pub async fn run(
        &self,
        template_id: RemoteId,
        image_id: RemoteId,
    ) -> Result<ImportOutcome, AppError> {
        debug!(
            "Importing image {} of product {} from {}",
            image_id, template_id, self.backend.name
        );

        let ctx = MapContext::new(self.backend, self.store, self.resizer);
        let ctx = &ctx;
        let mapper = &self.mapper;
        let store = self.store;
        let backend_id = self.backend.id;

        let outcome = import_pipeline(
            || self.adapter.read(template_id, image_id),
            move |record| async move { mapper.map(&record, ctx).await },
            move |fields| async move {
                store
                    .upsert_bound(backend_id, Model::ProductImage, image_id, &fields)
                    .await
            },
            |err| self.on_failure(template_id, image_id, err),
        )
        .await?;

        match outcome {
            ImportOutcome::Created(id) => info!("Created image {} ({})", image_id, id),
            ImportOutcome::Updated(id) => info!("Updated image {} ({})", image_id, id),
            ImportOutcome::Checkpointed => {}
        }
        Ok(outcome)
    }

    // The parent template, not the image, is what a user can act on.
    async fn on_failure(
        &self,
        template_id: RemoteId,
        image_id: RemoteId,
        err: AppError,
    ) -> Result<ImportOutcome, AppError> {
        if !err.is_transport() {
            return Err(err);
        }

        let binder = Binder::new(self.store, self.backend.id, Model::ProductTemplate);
        match binder.to_record(template_id).await? {
            Some(template) => {
                let message = format!("Import of image id `{}` failed. Error: `{}`", image_id, err);
                warn!("{}", message);
                self.store
                    .add_checkpoint(self.backend.id, Some(template.record_ref()), &message)
                    .await?;
            }
            None => {
                // Unlinked checkpoint: the parent is not imported either.
                let message = format!(
                    "Import of image id `{}` of PrestaShop product with id `{}` failed. Error: `{}`",
                    image_id, template_id, err
                );
                warn!("{}", message);
                self.store
                    .add_checkpoint(self.backend.id, None, &message)
                    .await?;
            }
        }
        Ok(ImportOutcome::Checkpointed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, ImageImportType, RecordRef};
    use crate::testing::{FakeAdapter, FakeResizer, MemoryStore};

    fn backend() -> Backend {
        Backend {
            id: 1,
            name: "shop".to_string(),
            location: "https://shop.example.com".to_string(),
            import_image_type: ImageImportType::Url,
            resize_images: false,
        }
    }

    fn image_record() -> RemoteRecord {
        RemoteRecord::new()
            .with("id_image", 42)
            .with("id_product", 10)
            .with("type", "image/jpeg")
            .with("full_public_url", "https://shop.example.com/img/p/4/2/42.jpg")
    }

    #[tokio::test]
    async fn test_first_import_creates_record_and_binding() {
        let store = MemoryStore::new();
        let template = store.add_template("Mug");
        store.bind(1, Model::ProductTemplate, RemoteId(10), template);
        let adapter = FakeAdapter::returning(image_record());
        let backend = backend();
        let resizer = FakeResizer::default();

        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();
        let outcome = importer.run(RemoteId(10), RemoteId(42)).await.unwrap();

        let ImportOutcome::Created(image_id) = outcome else {
            panic!("expected Created, got {:?}", outcome);
        };
        assert_eq!(adapter.calls(), vec![(RemoteId(10), RemoteId(42))]);
        let image = store.image(image_id).unwrap();
        assert_eq!(image.owner_id, template);
        assert_eq!(image.name, "Mug_42");
        assert_eq!(
            store
                .find_binding(1, Model::ProductImage, RemoteId(42))
                .await
                .unwrap()
                .map(|b| b.local_id),
            Some(image_id)
        );
    }

    #[tokio::test]
    async fn test_reimport_updates_existing_binding_target() {
        let store = MemoryStore::new();
        let template = store.add_template("Mug");
        store.bind(1, Model::ProductTemplate, RemoteId(10), template);
        let adapter = FakeAdapter::returning(image_record());
        let backend = backend();
        let resizer = FakeResizer::default();
        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();

        let first = importer.run(RemoteId(10), RemoteId(42)).await.unwrap();
        store.rename(Model::ProductTemplate, template, "Cup");
        let second = importer.run(RemoteId(10), RemoteId(42)).await.unwrap();

        let ImportOutcome::Created(id) = first else {
            panic!("expected Created, got {:?}", first);
        };
        assert_eq!(second, ImportOutcome::Updated(id));
        // template binding + one image binding
        assert_eq!(store.binding_count(), 2);
        assert_eq!(store.image(id).unwrap().name, "Cup_42");
    }

    #[tokio::test]
    async fn test_transport_error_checkpoints_parent_template() {
        let store = MemoryStore::new();
        let template = store.add_template("Mug");
        store.bind(1, Model::ProductTemplate, RemoteId(10), template);
        let adapter = FakeAdapter::failing(AppError::ClientError("HTTP 500 from shop".into()));
        let backend = backend();
        let resizer = FakeResizer::default();

        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();
        let outcome = importer.run(RemoteId(10), RemoteId(42)).await.unwrap();

        assert_eq!(outcome, ImportOutcome::Checkpointed);
        let checkpoints = store.checkpoints();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(
            checkpoints[0].record,
            Some(RecordRef {
                model: Model::ProductTemplate,
                id: template
            })
        );
        assert!(checkpoints[0].message.contains("`42`"));
        assert!(checkpoints[0].message.contains("HTTP 500 from shop"));
        assert_eq!(store.binding_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_without_parent_creates_unlinked_checkpoint() {
        let store = MemoryStore::new();
        let adapter = FakeAdapter::failing(AppError::Timeout(30));
        let backend = backend();
        let resizer = FakeResizer::default();

        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();
        let outcome = importer.run(RemoteId(10), RemoteId(42)).await.unwrap();

        assert_eq!(outcome, ImportOutcome::Checkpointed);
        let checkpoints = store.checkpoints();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].record, None);
        assert_eq!(checkpoints[0].backend_id, 1);
        assert!(checkpoints[0].message.contains("image id `42`"));
        assert!(checkpoints[0].message.contains("product with id `10`"));
        assert!(checkpoints[0].message.contains("30 seconds"));
    }

    #[tokio::test]
    async fn test_missing_parent_binding_during_mapping_propagates() {
        let store = MemoryStore::new();
        let adapter = FakeAdapter::returning(image_record());
        let backend = backend();
        let resizer = FakeResizer::default();

        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();
        let err = importer.run(RemoteId(10), RemoteId(42)).await.unwrap_err();

        assert!(matches!(err, AppError::MissingBinding { .. }));
        assert!(store.checkpoints().is_empty());
        assert_eq!(store.binding_count(), 0);
    }

    #[tokio::test]
    async fn test_non_transport_fetch_error_propagates() {
        let store = MemoryStore::new();
        let adapter = FakeAdapter::failing(AppError::InvalidField {
            field: "content".into(),
            reason: "not base64".into(),
        });
        let backend = backend();
        let resizer = FakeResizer::default();

        let importer = ProductImageImporter::new(&backend, &store, &adapter, &resizer).unwrap();
        let err = importer.run(RemoteId(10), RemoteId(42)).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidField { .. }));
        assert!(store.checkpoints().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_passes_data_between_steps() {
        let outcome = import_pipeline(
            || async { Ok(RemoteRecord::new().with("id", 5)) },
            |record| async move {
                let id = record.remote_id("id")?;
                Ok(FieldSet::from([("ref".to_string(), FieldValue::Int(id.0))]))
            },
            |fields| async move {
                Ok(UpsertOutcome::Created(fields["ref"].as_int().unwrap_or_default()))
            },
            |err| async move { Err(err) },
        )
        .await
        .unwrap();
        assert_eq!(outcome, ImportOutcome::Created(5));
    }

    #[tokio::test]
    async fn test_pipeline_routes_errors_to_handler() {
        let outcome = import_pipeline(
            || async { Err(AppError::RateLimitExceeded) },
            |_record| async { Ok(FieldSet::new()) },
            |_fields| async { Ok(UpsertOutcome::Created(1)) },
            |err| async move {
                assert!(err.is_transport());
                Ok(ImportOutcome::Checkpointed)
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome, ImportOutcome::Checkpointed);
    }
}
