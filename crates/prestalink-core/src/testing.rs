//! In-memory fakes of every port, for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::jobs::Job;
use crate::models::{
    BackendId, Binding, Checkpoint, FieldSet, LocalId, LocalRecord, Model, RecordRef, RemoteId,
    RemoteRecord, UpsertOutcome,
};
use crate::ports::{
    BindingStore, CheckpointSink, ImageResizer, JobQueue, ProductBindingStore, QuantitySync,
    RecordAdapter, RecordStore, StockStore,
};
use crate::product_image::{ImageAttachment, ImageVariant, ResizedImages};
use crate::stock::{
    InventoryId, LocationId, MoveId, MoveState, Picking, PickingId, ProductBinding, ProductId,
    StockMove, StockMoveWrite,
};

#[derive(Default)]
pub struct MemoryStore {
    next_id: Cell<LocalId>,
    records: RefCell<BTreeMap<(Model, LocalId), LocalRecord>>,
    images: RefCell<BTreeMap<LocalId, ImageAttachment>>,
    bindings: RefCell<Vec<Binding>>,
    checkpoints: RefCell<Vec<Checkpoint>>,
    jobs: RefCell<Vec<Job>>,
    locations: RefCell<BTreeMap<LocationId, bool>>,
    moves: RefCell<BTreeMap<MoveId, StockMove>>,
    inventories: RefCell<BTreeMap<InventoryId, (Vec<MoveId>, bool)>>,
    pickings: RefCell<BTreeMap<PickingId, Picking>>,
    product_bindings: RefCell<Vec<(ProductId, ProductBinding)>>,
    write_calls: Cell<usize>,
    fail_enqueue: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> LocalId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn add_record(&self, model: Model, name: &str) -> LocalId {
        let id = self.next_id();
        self.records.borrow_mut().insert(
            (model, id),
            LocalRecord {
                model,
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn add_template(&self, name: &str) -> LocalId {
        self.add_record(Model::ProductTemplate, name)
    }

    pub fn rename(&self, model: Model, id: LocalId, name: &str) {
        if let Some(record) = self.records.borrow_mut().get_mut(&(model, id)) {
            record.name = name.to_string();
        }
    }

    pub fn bind(&self, backend_id: BackendId, model: Model, remote_id: RemoteId, local_id: LocalId) -> LocalId {
        let id = self.next_id();
        self.bindings.borrow_mut().push(Binding {
            id,
            backend_id,
            model,
            remote_id,
            local_id,
        });
        id
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn image(&self, id: LocalId) -> Option<ImageAttachment> {
        self.images.borrow().get(&id).cloned()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints.borrow().clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.borrow().clone()
    }

    /// Makes the next `enqueue` fail with a network error.
    pub fn fail_next_enqueue(&self) {
        self.fail_enqueue.set(true);
    }

    pub fn add_location(&self, synchronized: bool) -> LocationId {
        let id = self.next_id();
        self.locations.borrow_mut().insert(id, synchronized);
        id
    }

    pub fn set_synchronized(&self, location: LocationId, synchronized: bool) {
        self.locations.borrow_mut().insert(location, synchronized);
    }

    pub fn add_move(
        &self,
        product_id: ProductId,
        product_qty: f64,
        state: MoveState,
        location_id: LocationId,
        location_dest_id: LocationId,
    ) -> MoveId {
        let id = self.next_id();
        self.moves.borrow_mut().insert(
            id,
            StockMove {
                id,
                product_id,
                product_qty,
                state,
                location_id,
                location_dest_id,
            },
        );
        id
    }

    pub fn move_state(&self, id: MoveId) -> MoveState {
        self.moves.borrow()[&id].state
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.get()
    }

    pub fn add_inventory(&self, moves: &[MoveId]) -> InventoryId {
        let id = self.next_id();
        self.inventories
            .borrow_mut()
            .insert(id, (moves.to_vec(), false));
        id
    }

    pub fn inventory_done(&self, id: InventoryId) -> bool {
        self.inventories.borrow()[&id].1
    }

    pub fn add_product_binding(
        &self,
        product_id: ProductId,
        backend_id: BackendId,
        remote_id: RemoteId,
        quantity: Option<f64>,
    ) -> LocalId {
        let id = self.next_id();
        self.product_bindings.borrow_mut().push((
            product_id,
            ProductBinding {
                id,
                backend_id,
                remote_id,
                quantity,
            },
        ));
        id
    }

    pub fn product_binding_quantity(&self, id: LocalId) -> Option<f64> {
        self.product_bindings
            .borrow()
            .iter()
            .find(|(_, b)| b.id == id)
            .and_then(|(_, b)| b.quantity)
    }
}

impl BindingStore for MemoryStore {
    async fn find_binding(
        &self,
        backend_id: BackendId,
        model: Model,
        remote_id: RemoteId,
    ) -> Result<Option<Binding>, AppError> {
        Ok(self
            .bindings
            .borrow()
            .iter()
            .find(|b| b.backend_id == backend_id && b.model == model && b.remote_id == remote_id)
            .cloned())
    }

    async fn load_record(&self, model: Model, id: LocalId) -> Result<Option<LocalRecord>, AppError> {
        Ok(self.records.borrow().get(&(model, id)).cloned())
    }

    async fn record_bindings(&self, model: Model, id: LocalId) -> Result<Vec<Binding>, AppError> {
        Ok(self
            .bindings
            .borrow()
            .iter()
            .filter(|b| b.model == model && b.local_id == id)
            .cloned()
            .collect())
    }
}

impl RecordStore for MemoryStore {
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
        let name = image.name.clone();

        let existing = self.find_binding(backend_id, model, remote_id).await?;
        let (id, outcome) = match existing {
            Some(binding) => (binding.local_id, UpsertOutcome::Updated(binding.local_id)),
            None => {
                let id = self.next_id();
                self.bind(backend_id, model, remote_id, id);
                (id, UpsertOutcome::Created(id))
            }
        };
        self.images.borrow_mut().insert(id, image);
        self.records
            .borrow_mut()
            .insert((model, id), LocalRecord { model, id, name });
        Ok(outcome)
    }
}

impl CheckpointSink for MemoryStore {
    async fn add_checkpoint(
        &self,
        backend_id: BackendId,
        record: Option<RecordRef>,
        message: &str,
    ) -> Result<(), AppError> {
        let id = self.next_id();
        self.checkpoints.borrow_mut().push(Checkpoint {
            id,
            backend_id,
            record,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

impl JobQueue for MemoryStore {
    async fn enqueue(&self, job: Job) -> Result<Uuid, AppError> {
        if self.fail_enqueue.replace(false) {
            return Err(AppError::NetworkError("queue unavailable".to_string()));
        }
        self.jobs.borrow_mut().push(job);
        Ok(Uuid::new_v4())
    }
}

impl StockStore for MemoryStore {
    async fn synchronized_locations(&self) -> Result<HashSet<LocationId>, AppError> {
        Ok(self
            .locations
            .borrow()
            .iter()
            .filter(|(_, synced)| **synced)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn read_moves(&self, ids: &[MoveId]) -> Result<Vec<StockMove>, AppError> {
        let moves = self.moves.borrow();
        Ok(ids.iter().filter_map(|id| moves.get(id).cloned()).collect())
    }

    async fn write_moves(&self, ids: &[MoveId], vals: &StockMoveWrite) -> Result<(), AppError> {
        self.write_calls.set(self.write_calls.get() + 1);
        let mut moves = self.moves.borrow_mut();
        for id in ids {
            let Some(mv) = moves.get_mut(id) else {
                continue;
            };
            if let Some(state) = vals.state {
                mv.state = state;
            }
            if let Some(qty) = vals.product_qty {
                mv.product_qty = qty;
            }
            if let Some(location) = vals.location_id {
                mv.location_id = location;
            }
            if let Some(location) = vals.location_dest_id {
                mv.location_dest_id = location;
            }
        }
        Ok(())
    }

    async fn product_quantity(
        &self,
        product_id: ProductId,
        locations: &HashSet<LocationId>,
    ) -> Result<f64, AppError> {
        Ok(self
            .moves
            .borrow()
            .values()
            .filter(|mv| mv.product_id == product_id && mv.state == MoveState::Done)
            .map(|mv| {
                let incoming = if locations.contains(&mv.location_dest_id) { mv.product_qty } else { 0.0 };
                let outgoing = if locations.contains(&mv.location_id) { mv.product_qty } else { 0.0 };
                incoming - outgoing
            })
            .sum())
    }

    async fn inventory_moves(&self, inventory_id: InventoryId) -> Result<Vec<StockMove>, AppError> {
        let ids = self
            .inventories
            .borrow()
            .get(&inventory_id)
            .map(|(moves, _)| moves.clone())
            .unwrap_or_default();
        self.read_moves(&ids).await
    }

    async fn set_inventory_done(&self, inventory_id: InventoryId) -> Result<(), AppError> {
        if let Some(inventory) = self.inventories.borrow_mut().get_mut(&inventory_id) {
            inventory.1 = true;
        }
        Ok(())
    }

    async fn load_picking(&self, picking_id: PickingId) -> Result<Option<Picking>, AppError> {
        Ok(self.pickings.borrow().get(&picking_id).cloned())
    }
}

impl ProductBindingStore for MemoryStore {
    async fn product_bindings(&self, product_id: ProductId) -> Result<Vec<ProductBinding>, AppError> {
        Ok(self
            .product_bindings
            .borrow()
            .iter()
            .filter(|(product, _)| *product == product_id)
            .map(|(_, binding)| binding.clone())
            .collect())
    }

    async fn set_binding_quantity(&self, binding_id: LocalId, quantity: f64) -> Result<(), AppError> {
        for (_, binding) in self.product_bindings.borrow_mut().iter_mut() {
            if binding.id == binding_id {
                binding.quantity = Some(quantity);
            }
        }
        Ok(())
    }
}

/// Resizer that tags the payload with the variant name.
#[derive(Default)]
pub struct FakeResizer {
    fail: bool,
    calls: Cell<usize>,
}

impl FakeResizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ImageResizer for FakeResizer {
    fn resize(&self, data: &[u8]) -> Result<ResizedImages, AppError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(AppError::ImageResize("corrupt payload".to_string()));
        }
        let mut out = ResizedImages::default();
        out.insert(ImageVariant::Big, [b"big:".as_slice(), data].concat());
        out.insert(ImageVariant::Medium, [b"medium:".as_slice(), data].concat());
        Ok(out)
    }
}

enum AdapterResponse {
    Record(RemoteRecord),
    Error(RefCell<Option<AppError>>),
}

/// Adapter returning a canned record or error.
pub struct FakeAdapter {
    response: AdapterResponse,
    calls: RefCell<Vec<(RemoteId, RemoteId)>>,
}

impl FakeAdapter {
    pub fn returning(record: RemoteRecord) -> Self {
        Self {
            response: AdapterResponse::Record(record),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(err: AppError) -> Self {
        Self {
            response: AdapterResponse::Error(RefCell::new(Some(err))),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(RemoteId, RemoteId)> {
        self.calls.borrow().clone()
    }
}

impl RecordAdapter for FakeAdapter {
    async fn read(&self, parent_id: RemoteId, entity_id: RemoteId) -> Result<RemoteRecord, AppError> {
        self.calls.borrow_mut().push((parent_id, entity_id));
        match &self.response {
            AdapterResponse::Record(record) => Ok(record.clone()),
            AdapterResponse::Error(err) => Err(err
                .borrow_mut()
                .take()
                .unwrap_or_else(|| AppError::Generic("adapter error already consumed".to_string()))),
        }
    }
}

/// Records recompute/export requests.
#[derive(Default)]
pub struct RecordingQuantities {
    invalidations: RefCell<Vec<ProductId>>,
    updates: RefCell<Vec<ProductId>>,
}

impl RecordingQuantities {
    pub fn invalidations(&self) -> Vec<ProductId> {
        self.invalidations.borrow().clone()
    }

    pub fn updates(&self) -> Vec<ProductId> {
        self.updates.borrow().clone()
    }
}

impl QuantitySync for RecordingQuantities {
    fn invalidate_cache(&self, product_id: ProductId) {
        self.invalidations.borrow_mut().push(product_id);
    }

    async fn update_remote_qty(&self, product_id: ProductId) -> Result<(), AppError> {
        self.updates.borrow_mut().push(product_id);
        Ok(())
    }
}
