//! Reactions to shipment events.

use tracing::info;

use crate::error::AppError;
use crate::jobs::Job;
use crate::models::Model;
use crate::ports::{BindingStore, JobQueue};
use crate::stock::Picking;

/// Schedules exports when a picking changes.
pub struct PickingListener<'a, S, Q> {
    store: &'a S,
    queue: &'a Q,
}

impl<'a, S: BindingStore, Q: JobQueue> PickingListener<'a, S, Q> {
    pub fn new(store: &'a S, queue: &'a Q) -> Self {
        Self { store, queue }
    }

    /// Enqueues a tracking-number export for every shop binding of the
    /// picking's sale order. Returns the number of jobs scheduled.
    pub async fn on_tracking_number_added(&self, picking: &Picking) -> Result<usize, AppError> {
        let Some(sale_id) = picking.sale_id else {
            return Ok(0);
        };

        let bindings = self.store.record_bindings(Model::SaleOrder, sale_id).await?;
        for binding in &bindings {
            let job = Job::ExportTrackingNumber {
                backend_id: binding.backend_id,
                binding_id: binding.id,
                remote_id: binding.remote_id,
            };
            let uuid = self.queue.enqueue(job).await?;
            info!(
                "Picking {}: tracking number export queued for order {} (job {})",
                picking.id, binding.remote_id, uuid
            );
        }
        Ok(bindings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteId;
    use crate::testing::MemoryStore;

    #[tokio::test]
    async fn test_tracking_number_export_per_sale_binding() {
        let store = MemoryStore::new();
        let sale = store.add_record(Model::SaleOrder, "SO042");
        let first = store.bind(1, Model::SaleOrder, RemoteId(500), sale);
        let second = store.bind(2, Model::SaleOrder, RemoteId(77), sale);
        let picking = Picking {
            id: 9,
            sale_id: Some(sale),
            carrier_tracking_ref: Some("1Z999".to_string()),
        };

        let listener = PickingListener::new(&store, &store);
        let scheduled = listener.on_tracking_number_added(&picking).await.unwrap();

        assert_eq!(scheduled, 2);
        assert_eq!(
            store.jobs(),
            vec![
                Job::ExportTrackingNumber {
                    backend_id: 1,
                    binding_id: first,
                    remote_id: RemoteId(500),
                },
                Job::ExportTrackingNumber {
                    backend_id: 2,
                    binding_id: second,
                    remote_id: RemoteId(77),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_picking_without_sale_schedules_nothing() {
        let store = MemoryStore::new();
        let picking = Picking {
            id: 9,
            sale_id: None,
            carrier_tracking_ref: Some("1Z999".to_string()),
        };

        let listener = PickingListener::new(&store, &store);
        assert_eq!(listener.on_tracking_number_added(&picking).await.unwrap(), 0);
        assert!(store.jobs().is_empty());
    }
}
