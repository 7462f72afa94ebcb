use std::collections::HashMap;

use tracing::warn;

use crate::identity::FulfillmentId;
use crate::models::{ChargeLocation, Connector, Evse, Tariff};
use crate::ResolveError;

/// One (location, EVSE, connector) triple resolved from the index.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorRef<'a> {
    pub location: &'a ChargeLocation,
    pub evse: &'a Evse,
    pub connector: &'a Connector,
}

impl ConnectorRef<'_> {
    pub fn fulfillment_id(&self) -> FulfillmentId {
        FulfillmentId::new(self.evse, self.connector)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    location: usize,
    evse: usize,
    connector: usize,
}

/// Per-request view over one inventory snapshot.
///
/// Fulfillment ids are not guaranteed unique upstream. When two connectors
/// derive the same id, the first one in fetch order owns it; later ones are
/// logged, listed in [`InventoryIndex::collisions`], and never resolved.
#[derive(Debug, Default)]
pub struct InventoryIndex {
    locations: Vec<ChargeLocation>,
    by_fulfillment: HashMap<FulfillmentId, Slot>,
    tariffs: HashMap<String, Tariff>,
    collisions: Vec<FulfillmentId>,
}

impl InventoryIndex {
    pub fn build(locations: Vec<ChargeLocation>, tariffs: Vec<Tariff>) -> Self {
        let mut by_fulfillment = HashMap::new();
        let mut collisions = Vec::new();

        for (li, location) in locations.iter().enumerate() {
            for (ei, evse) in location.evses.iter().enumerate() {
                for (ci, connector) in evse.connectors.iter().enumerate() {
                    let id = FulfillmentId::new(evse, connector);
                    if by_fulfillment.contains_key(&id) {
                        warn!(
                            fulfillment_id = %id,
                            location_id = %location.id,
                            "duplicate fulfillment id, keeping the first connector"
                        );
                        collisions.push(id);
                        continue;
                    }
                    by_fulfillment.insert(
                        id,
                        Slot {
                            location: li,
                            evse: ei,
                            connector: ci,
                        },
                    );
                }
            }
        }

        let mut tariff_map = HashMap::with_capacity(tariffs.len());
        for tariff in tariffs {
            if tariff.id.is_empty() {
                continue;
            }
            tariff_map.entry(tariff.id.clone()).or_insert(tariff);
        }

        InventoryIndex {
            locations,
            by_fulfillment,
            tariffs: tariff_map,
            collisions,
        }
    }

    pub fn locations(&self) -> &[ChargeLocation] {
        &self.locations
    }

    pub fn find_by_fulfillment_id(&self, id: &str) -> Option<ConnectorRef<'_>> {
        let slot = self.by_fulfillment.get(&FulfillmentId::from(id))?;
        let location = &self.locations[slot.location];
        let evse = &location.evses[slot.evse];
        Some(ConnectorRef {
            location,
            evse,
            connector: &evse.connectors[slot.connector],
        })
    }

    pub fn require(&self, id: &str) -> Result<ConnectorRef<'_>, ResolveError> {
        self.find_by_fulfillment_id(id)
            .ok_or_else(|| ResolveError::ConnectorNotFound {
                fulfillment_id: id.to_string(),
            })
    }

    /// Whether `location_id` owns `id`, i.e. a lookup by `id` lands there.
    pub fn is_owner(&self, id: &FulfillmentId, location_id: &str) -> bool {
        self.by_fulfillment
            .get(id)
            .is_some_and(|slot| self.locations[slot.location].id == location_id)
    }

    pub fn tariff(&self, id: &str) -> Option<&Tariff> {
        self.tariffs.get(id)
    }

    pub fn tariff_lookup(&self) -> &HashMap<String, Tariff> {
        &self.tariffs
    }

    pub fn collisions(&self) -> &[FulfillmentId] {
        &self.collisions
    }

    pub fn connector_count(&self) -> usize {
        self.by_fulfillment.len()
    }
}
