//! Prestalink Client - HTTP access to PrestaShop shops
//!
//! - [`prestashop`] - PrestaShop webservice client and record adapters
//!
//! The client handles authentication, retries and turning webservice
//! responses into [`prestalink_core::RemoteRecord`]s the importers map.

pub mod prestashop;

pub use prestashop::{PrestashopClient, ProductImageAdapter};
