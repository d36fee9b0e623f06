//! Descriptors of export jobs handed to the external queue.

use serde::{Deserialize, Serialize};

use crate::models::{BackendId, LocalId, RemoteId};

/// A unit of outbound work.
///
/// Payloads are self-contained: the queue may run them in any order, possibly
/// before the operation that scheduled them has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Push a product's available quantity to the shop.
    ExportStockQty {
        backend_id: BackendId,
        binding_id: LocalId,
        remote_id: RemoteId,
        quantity: f64,
    },
    /// Push the tracking number of a shipped order to the shop.
    ExportTrackingNumber {
        backend_id: BackendId,
        binding_id: LocalId,
        remote_id: RemoteId,
    },
}

impl Job {
    /// Serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ExportStockQty { .. } => "export_stock_qty",
            Job::ExportTrackingNumber { .. } => "export_tracking_number",
        }
    }

    pub fn backend_id(&self) -> BackendId {
        match self {
            Job::ExportStockQty { backend_id, .. } | Job::ExportTrackingNumber { backend_id, .. } => {
                *backend_id
            }
        }
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match self {
            Job::ExportStockQty {
                remote_id,
                quantity,
                ..
            } => format!("export qty {} for product {}", quantity, remote_id),
            Job::ExportTrackingNumber { remote_id, .. } => {
                format!("export tracking number for order {}", remote_id)
            }
        }
    }
}
