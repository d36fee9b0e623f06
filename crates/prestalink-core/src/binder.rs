//! Remote id → local record resolution.

use crate::error::AppError;
use crate::models::{BackendId, Binding, LocalRecord, Model, RemoteId};
use crate::ports::BindingStore;

/// What [`Binder::to_internal`] resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Internal {
    /// The binding row itself (`unwrap = false`).
    Binding(Binding),
    /// The bound local record (`unwrap = true`).
    Record(LocalRecord),
}

/// Resolves remote ids of one model on one backend.
///
/// Read-only: bindings are created by [`RecordStore::upsert_bound`] during
/// import, never here.
///
/// [`RecordStore::upsert_bound`]: crate::ports::RecordStore::upsert_bound
pub struct Binder<'a, S> {
    store: &'a S,
    backend_id: BackendId,
    model: Model,
}

impl<'a, S: BindingStore> Binder<'a, S> {
    pub fn new(store: &'a S, backend_id: BackendId, model: Model) -> Self {
        Self {
            store,
            backend_id,
            model,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Looks up the binding for `remote_id`.
    ///
    /// With `unwrap`, returns the bound local record instead of the binding.
    /// Returns `None` when there is no binding, or when the bound record no
    /// longer exists.
    pub async fn to_internal(
        &self,
        remote_id: RemoteId,
        unwrap: bool,
    ) -> Result<Option<Internal>, AppError> {
        let Some(binding) = self
            .store
            .find_binding(self.backend_id, self.model, remote_id)
            .await?
        else {
            return Ok(None);
        };

        if !unwrap {
            return Ok(Some(Internal::Binding(binding)));
        }

        let record = self.store.load_record(self.model, binding.local_id).await?;
        Ok(record.map(Internal::Record))
    }

    /// Shorthand for `to_internal(remote_id, true)`.
    pub async fn to_record(&self, remote_id: RemoteId) -> Result<Option<LocalRecord>, AppError> {
        match self.to_internal(remote_id, true).await? {
            Some(Internal::Record(record)) => Ok(Some(record)),
            _ => Ok(None),
        }
    }
}
