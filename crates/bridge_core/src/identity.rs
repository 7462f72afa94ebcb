//! Cross-protocol identifiers.
//!
//! A [`FulfillmentId`] names one physical connector (`<evse uid>_<connector id>`)
//! and is how select/init/confirm find their way back to the connector chosen
//! at search time. An [`ItemId`] names a price tier: connectors that share a
//! tariff and a power rating share an item.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Connector, Evse};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FulfillmentId(String);

impl FulfillmentId {
    pub fn new(evse: &Evse, connector: &Connector) -> Self {
        FulfillmentId(format!("{}_{}", evse.uid, connector.id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FulfillmentId {
    fn from(value: &str) -> Self {
        FulfillmentId(value.to_string())
    }
}

impl From<String> for FulfillmentId {
    fn from(value: String) -> Self {
        FulfillmentId(value)
    }
}

impl fmt::Display for FulfillmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Prefix of item ids minted for connectors without a tariff.
const UNTARIFFED_PREFIX: &str = "item_";

impl ItemId {
    /// Item for a connector priced by `tariff_id`: `<tariff id>_<max power>`.
    pub fn for_tariff(tariff_id: &str, connector: &Connector) -> Self {
        ItemId(format!("{}_{}", tariff_id, connector.max_electric_power))
    }

    /// Item for a connector with no usable tariff:
    /// `item_<evse uid>_<connector id>_<max power>`.
    pub fn untariffed(evse: &Evse, connector: &Connector) -> Self {
        ItemId(format!(
            "{UNTARIFFED_PREFIX}{}_{}_{}",
            evse.uid, connector.id, connector.max_electric_power
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the shape minted by [`ItemId::untariffed`]. A real
    /// tariff named `item_...` produces the same shape, so callers check the
    /// parsed tariff against the connector before discarding it.
    pub fn is_untariffed(&self) -> bool {
        self.0.starts_with(UNTARIFFED_PREFIX)
    }

    /// The tariff id encoded in a tariff item id.
    ///
    /// Tariff ids may themselves contain underscores, so only the last
    /// segment is treated as the quantity.
    pub fn tariff_id(&self) -> Option<&str> {
        let (tariff_id, quantity) = self.0.rsplit_once('_')?;
        if tariff_id.is_empty() || quantity.is_empty() {
            return None;
        }
        Some(tariff_id)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evse(uid: &str) -> Evse {
        Evse {
            uid: uid.to_string(),
            ..Default::default()
        }
    }

    fn connector(id: &str, power: u64) -> Connector {
        Connector {
            id: id.to_string(),
            max_electric_power: power,
            ..Default::default()
        }
    }

    #[test]
    fn test_fulfillment_id_is_stable() {
        let (e, c) = (evse("EVSE002"), connector("2", 22000));
        let first = FulfillmentId::new(&e, &c);
        let second = FulfillmentId::new(&e, &c);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "EVSE002_2");
    }

    #[test]
    fn test_item_ids() {
        let (e, c) = (evse("EVSE001"), connector("1", 50000));
        assert_eq!(ItemId::for_tariff("TARIFF_001", &c).as_str(), "TARIFF_001_50000");
        assert_eq!(ItemId::untariffed(&e, &c).as_str(), "item_EVSE001_1_50000");
    }

    #[test]
    fn test_tariff_id_round_trips_through_item_id() {
        let c = connector("1", 50000);
        let item = ItemId::for_tariff("TARIFF_001", &c);
        assert_eq!(item.tariff_id(), Some("TARIFF_001"));
        assert_eq!(ItemId::from("T1_50000").tariff_id(), Some("T1"));
    }

    #[test]
    fn test_untariffed_shape() {
        let (e, c) = (evse("EVSE001"), connector("1", 50000));
        assert!(ItemId::untariffed(&e, &c).is_untariffed());
        assert!(!ItemId::for_tariff("TARIFF_001", &c).is_untariffed());

        let lookalike = ItemId::for_tariff("item_special", &c);
        assert!(lookalike.is_untariffed());
        assert_eq!(lookalike.tariff_id(), Some("item_special"));
    }

    #[test]
    fn test_tariff_id_absent() {
        assert_eq!(ItemId::from("plain").tariff_id(), None);
        assert_eq!(ItemId::from("T1_").tariff_id(), None);
        assert_eq!(ItemId::from("").tariff_id(), None);
    }
}
