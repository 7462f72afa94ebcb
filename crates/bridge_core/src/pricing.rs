use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::identity::ItemId;
use crate::models::{Connector, Evse, Tariff};
use crate::ResolveError;

/// Unit price of one connector's energy, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPrice {
    pub price: Decimal,
    pub currency: String,
    pub tariff_id: Option<String>,
}

/// How an offer is priced in a catalog.
#[derive(Debug, Clone)]
pub enum OfferPrice {
    /// Full tariff decomposition: the unit price plus the tariff it came from.
    Priced { unit: UnitPrice, tariff: Tariff },
    /// Decomposition disabled: only the raw tariff references.
    TariffRefs(Vec<String>),
    /// No usable tariff.
    Unpriced,
}

/// A sellable offer for one connector.
#[derive(Debug, Clone)]
pub struct Offer {
    pub item_id: ItemId,
    pub price: OfferPrice,
}

/// Extracts unit prices from OCPI tariffs.
///
/// Only the first tariff reference of a connector is consulted. Within a
/// tariff only the first element is read: its `ENERGY` component if there is
/// one, otherwise its first component.
#[derive(Debug, Clone)]
pub struct PricingResolver {
    decomposition_enabled: bool,
    default_currency: String,
}

impl PricingResolver {
    pub fn new(decomposition_enabled: bool, default_currency: impl Into<String>) -> Self {
        PricingResolver {
            decomposition_enabled,
            default_currency: default_currency.into(),
        }
    }

    pub fn decomposition_enabled(&self) -> bool {
        self.decomposition_enabled
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    pub fn resolve(
        &self,
        connector: &Connector,
        tariffs: &HashMap<String, Tariff>,
    ) -> Result<UnitPrice, ResolveError> {
        match connector.tariff_ids.first() {
            None => Ok(UnitPrice {
                price: Decimal::ZERO,
                currency: self.default_currency.clone(),
                tariff_id: None,
            }),
            Some(tariff_id) => self.resolve_tariff(tariff_id, tariffs),
        }
    }

    pub fn resolve_tariff(
        &self,
        tariff_id: &str,
        tariffs: &HashMap<String, Tariff>,
    ) -> Result<UnitPrice, ResolveError> {
        let tariff = tariffs
            .get(tariff_id)
            .ok_or_else(|| ResolveError::TariffNotFound {
                tariff_id: tariff_id.to_string(),
            })?;
        Ok(self.unit_price(tariff))
    }

    pub fn unit_price(&self, tariff: &Tariff) -> UnitPrice {
        UnitPrice {
            price: energy_price(tariff),
            currency: tariff
                .currency
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| self.default_currency.clone()),
            tariff_id: Some(tariff.id.clone()),
        }
    }

    /// The tariff that applies when a buyer asks for `requested`.
    ///
    /// The requested tariff wins while the connector still lists it; otherwise
    /// the connector's first tariff is used.
    pub fn applicable_tariff<'c>(
        &self,
        connector: &'c Connector,
        requested: Option<&str>,
    ) -> Result<&'c str, ResolveError> {
        if let Some(requested) = requested {
            if let Some(id) = connector.tariff_ids.iter().find(|id| *id == requested) {
                return Ok(id.as_str());
            }
            debug!(
                requested,
                connector_id = %connector.id,
                "requested tariff no longer listed on connector"
            );
        }
        connector
            .tariff_ids
            .first()
            .map(String::as_str)
            .ok_or_else(|| ResolveError::NoApplicableTariff {
                connector_id: connector.id.clone(),
            })
    }

    /// The catalog offer for one connector.
    ///
    /// A tariff reference that does not resolve degrades to an unpriced offer.
    pub fn offer(
        &self,
        evse: &Evse,
        connector: &Connector,
        tariffs: &HashMap<String, Tariff>,
    ) -> Offer {
        let Some(tariff_id) = connector.tariff_ids.first() else {
            return Offer {
                item_id: ItemId::untariffed(evse, connector),
                price: OfferPrice::Unpriced,
            };
        };

        if !self.decomposition_enabled {
            return Offer {
                item_id: ItemId::for_tariff(tariff_id, connector),
                price: OfferPrice::TariffRefs(connector.tariff_ids.clone()),
            };
        }

        match tariffs.get(tariff_id.as_str()) {
            Some(tariff) => Offer {
                item_id: ItemId::for_tariff(tariff_id, connector),
                price: OfferPrice::Priced {
                    unit: self.unit_price(tariff),
                    tariff: tariff.clone(),
                },
            },
            None => {
                warn!(
                    tariff_id = %tariff_id,
                    evse_uid = %evse.uid,
                    connector_id = %connector.id,
                    "tariff not found, offering connector unpriced"
                );
                Offer {
                    item_id: ItemId::untariffed(evse, connector),
                    price: OfferPrice::Unpriced,
                }
            }
        }
    }
}

/// Price of a tariff's first element: its `ENERGY` component, otherwise the
/// first component, otherwise zero.
pub fn energy_price(tariff: &Tariff) -> Decimal {
    let Some(element) = tariff.elements.first() else {
        return Decimal::ZERO;
    };
    element
        .price_components
        .iter()
        .find(|component| component.is_energy())
        .or_else(|| element.price_components.first())
        .map_or(Decimal::ZERO, |component| component.price)
}
