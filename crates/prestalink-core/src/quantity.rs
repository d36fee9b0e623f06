//! Recomputes product quantities and schedules their export.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::AppError;
use crate::jobs::Job;
use crate::ports::{JobQueue, ProductBindingStore, QuantitySync, StockStore};
use crate::stock::ProductId;

/// Computes on-hand quantities over synchronized locations and enqueues an
/// export for every product binding whose last exported quantity differs.
///
/// Computed quantities are cached per product until invalidated.
pub struct QuantityExporter<'a, S, Q> {
    store: &'a S,
    queue: &'a Q,
    cache: RefCell<HashMap<ProductId, f64>>,
}

impl<'a, S, Q> QuantityExporter<'a, S, Q>
where
    S: StockStore + ProductBindingStore,
    Q: JobQueue,
{
    pub fn new(store: &'a S, queue: &'a Q) -> Self {
        Self {
            store,
            queue,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Quantity of `product_id` in synchronized locations.
    pub async fn quantity(&self, product_id: ProductId) -> Result<f64, AppError> {
        if let Some(qty) = self.cache.borrow().get(&product_id).copied() {
            return Ok(qty);
        }
        let locations = self.store.synchronized_locations().await?;
        let qty = self.store.product_quantity(product_id, &locations).await?;
        self.cache.borrow_mut().insert(product_id, qty);
        Ok(qty)
    }
}

impl<S, Q> QuantitySync for QuantityExporter<'_, S, Q>
where
    S: StockStore + ProductBindingStore,
    Q: JobQueue,
{
    fn invalidate_cache(&self, product_id: ProductId) {
        self.cache.borrow_mut().remove(&product_id);
    }

    async fn update_remote_qty(&self, product_id: ProductId) -> Result<(), AppError> {
        let quantity = self.quantity(product_id).await?;
        for binding in self.store.product_bindings(product_id).await? {
            if binding.quantity == Some(quantity) {
                debug!(
                    "Product {} unchanged on backend {} ({})",
                    product_id, binding.backend_id, quantity
                );
                continue;
            }
            let job = Job::ExportStockQty {
                backend_id: binding.backend_id,
                binding_id: binding.id,
                remote_id: binding.remote_id,
                quantity,
            };
            let uuid = self.queue.enqueue(job.clone()).await?;
            // Recorded only once queued, so a failed enqueue is retried on the next update.
            self.store.set_binding_quantity(binding.id, quantity).await?;
            info!("Scheduled {} (job {})", job.describe(), uuid);
        }
        Ok(())
    }
}
