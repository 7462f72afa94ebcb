//! OCPI inventory model and the matching primitives the Beckn bridge is built
//! on: proximity filtering, cross-protocol identifiers, the per-request
//! inventory index and tariff pricing.

pub mod geo;
pub mod identity;
pub mod inventory;
pub mod models;
pub mod money;
pub mod pricing;
pub mod wire;

pub use crate::geo::{NearbyLocation, distance_km, filter_by_proximity};
pub use crate::identity::{FulfillmentId, ItemId};
pub use crate::inventory::{ConnectorRef, InventoryIndex};
pub use crate::models::*;
pub use crate::pricing::{Offer, OfferPrice, PricingResolver, UnitPrice};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No connector found for fulfillment id {fulfillment_id}")]
    ConnectorNotFound { fulfillment_id: String },
    #[error("Tariff {tariff_id} not found")]
    TariffNotFound { tariff_id: String },
    #[error("No applicable tariff found for connector {connector_id}")]
    NoApplicableTariff { connector_id: String },
}
