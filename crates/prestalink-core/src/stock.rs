//! Stock change propagation.
//!
//! Local inventory writes decide here whether the remote shop's quantities
//! must be recomputed and exported. Only moves touching a synchronized
//! location trigger an export.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{BackendId, LocalId, RemoteId};
use crate::ports::{QuantitySync, StockStore};

pub type ProductId = LocalId;
pub type LocationId = LocalId;
pub type MoveId = LocalId;
pub type InventoryId = LocalId;
pub type PickingId = LocalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    Draft,
    Waiting,
    Confirmed,
    Assigned,
    Done,
    Cancel,
}

impl MoveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveState::Draft => "draft",
            MoveState::Waiting => "waiting",
            MoveState::Confirmed => "confirmed",
            MoveState::Assigned => "assigned",
            MoveState::Done => "done",
            MoveState::Cancel => "cancel",
        }
    }
}

impl fmt::Display for MoveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(MoveState::Draft),
            "waiting" => Ok(MoveState::Waiting),
            "confirmed" => Ok(MoveState::Confirmed),
            "assigned" => Ok(MoveState::Assigned),
            "done" => Ok(MoveState::Done),
            "cancel" => Ok(MoveState::Cancel),
            other => Err(AppError::InvalidField {
                field: "state".to_string(),
                reason: format!("unknown move state `{}`", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMove {
    pub id: MoveId,
    pub product_id: ProductId,
    pub product_qty: f64,
    pub state: MoveState,
    pub location_id: LocationId,
    pub location_dest_id: LocationId,
}

/// Incoming change to one or more stock moves.
///
/// The typed fields are the ones that affect stock levels; anything else
/// lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMoveWrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MoveState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_qty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_dest_id: Option<LocationId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StockMoveWrite {
    pub fn state(state: MoveState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// True if the change sets any field that can alter stock levels.
    ///
    /// Presence counts, not value: writing a quantity of zero is a change.
    pub fn touches_stock(&self) -> bool {
        self.state.is_some()
            || self.product_qty.is_some()
            || self.location_id.is_some()
            || self.location_dest_id.is_some()
    }

    /// Locations a move touches across this write: its current source and
    /// destination plus any new ones set by the change.
    pub fn touched_locations(&self, mv: &StockMove) -> Vec<LocationId> {
        let mut locations = vec![mv.location_id, mv.location_dest_id];
        locations.extend(self.location_id);
        locations.extend(self.location_dest_id);
        locations
    }
}

/// Flags carried alongside a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteContext {
    /// Suppresses quantity export; set by bulk postings that export once at the end.
    pub no_export_stock: bool,
}

impl WriteContext {
    pub fn no_export() -> Self {
        Self {
            no_export_stock: true,
        }
    }
}

/// Outgoing shipment of a sale order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Picking {
    pub id: PickingId,
    pub sale_id: Option<LocalId>,
    pub carrier_tracking_ref: Option<String>,
}

/// Product binding with the last quantity exported to its shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBinding {
    pub id: LocalId,
    pub backend_id: BackendId,
    pub remote_id: RemoteId,
    pub quantity: Option<f64>,
}

/// Wraps stock writes with the quantity export rule.
pub struct StockPropagator<'a, S, Q> {
    store: &'a S,
    quantities: &'a Q,
}

impl<'a, S: StockStore, Q: QuantitySync> StockPropagator<'a, S, Q> {
    pub fn new(store: &'a S, quantities: &'a Q) -> Self {
        Self { store, quantities }
    }

    /// Writes `vals` on the moves and exports quantities when needed.
    ///
    /// A product is exported when one of its moves had, before the write, or
    /// gets through the write, a synchronized source or destination. Each
    /// product is exported at most once per call.
    ///
    /// Returns the products whose quantity was exported.
    pub async fn write_moves(
        &self,
        move_ids: &[MoveId],
        vals: &StockMoveWrite,
        ctx: WriteContext,
    ) -> Result<Vec<ProductId>, AppError> {
        if !vals.touches_stock() || ctx.no_export_stock {
            self.store.write_moves(move_ids, vals).await?;
            return Ok(Vec::new());
        }

        let synchronized = self.store.synchronized_locations().await?;
        let snapshots: Vec<(ProductId, Vec<LocationId>)> = self
            .store
            .read_moves(move_ids)
            .await?
            .iter()
            .map(|mv| (mv.product_id, vals.touched_locations(mv)))
            .collect();

        self.store.write_moves(move_ids, vals).await?;

        let mut exported = Vec::new();
        for (product_id, locations) in snapshots {
            if exported.contains(&product_id) {
                continue;
            }
            if locations.iter().any(|l| synchronized.contains(l)) {
                self.export_product(product_id).await?;
                exported.push(product_id);
            }
        }
        debug!(
            "Stock write on {} move(s) exported {} product(s)",
            move_ids.len(),
            exported.len()
        );
        Ok(exported)
    }

    /// Validates an inventory adjustment.
    ///
    /// Pending moves are set to done with export suppressed, then every distinct
    /// product of the inventory is exported once.
    pub async fn post_inventory(&self, inventory_id: InventoryId) -> Result<Vec<ProductId>, AppError> {
        let moves = self.store.inventory_moves(inventory_id).await?;
        let pending: Vec<MoveId> = moves
            .iter()
            .filter(|mv| mv.state != MoveState::Done)
            .map(|mv| mv.id)
            .collect();

        if !pending.is_empty() {
            self.write_moves(
                &pending,
                &StockMoveWrite::state(MoveState::Done),
                WriteContext::no_export(),
            )
            .await?;
        }
        self.store.set_inventory_done(inventory_id).await?;

        let mut seen = HashSet::new();
        let products: Vec<ProductId> = moves
            .iter()
            .map(|mv| mv.product_id)
            .filter(|p| seen.insert(*p))
            .collect();
        for product_id in &products {
            self.export_product(*product_id).await?;
        }

        info!(
            "Posted inventory {}: {} move(s), {} product(s) exported",
            inventory_id,
            moves.len(),
            products.len()
        );
        Ok(products)
    }

    async fn export_product(&self, product_id: ProductId) -> Result<(), AppError> {
        self.quantities.invalidate_cache(product_id);
        self.quantities.update_remote_qty(product_id).await
    }
}
