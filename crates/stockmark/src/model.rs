//! Combination records and the availability decision built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (option name, option value) pair of a combination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionPair {
    /// Option name, e.g. `Size`
    #[serde(default)]
    pub name: Option<String>,
    /// Option value, e.g. `M`
    #[serde(default)]
    pub value: Option<String>,
}

impl OptionPair {
    /// A complete pair
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }
}

/// A purchasable variant combination and its stock signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationRecord {
    /// Option pairs identifying the combination
    #[serde(default)]
    pub options: Vec<OptionPair>,
    /// Stock is not tracked for this combination
    #[serde(default)]
    pub unlimited: bool,
    /// Units in stock
    #[serde(default)]
    pub quantity: f64,
    /// Explicit in-stock flag
    #[serde(default)]
    pub in_stock: bool,
}

impl CombinationRecord {
    /// A combination with the given pairs and no stock
    #[must_use]
    pub fn new(options: &[(&str, &str)]) -> Self {
        Self {
            options: options
                .iter()
                .map(|(name, value)| OptionPair::new(name, value))
                .collect(),
            ..Self::default()
        }
    }

    /// Set the quantity
    #[must_use]
    pub const fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Mark stock as untracked
    #[must_use]
    pub const fn unlimited(mut self) -> Self {
        self.unlimited = true;
        self
    }

    /// Set the explicit in-stock flag
    #[must_use]
    pub const fn with_in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }

    /// Whether this combination can be bought right now
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.unlimited || self.quantity > 0.0 || self.in_stock
    }
}

/// Per option name, per option value: can it be bought?
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityDecision {
    options: BTreeMap<String, BTreeMap<String, bool>>,
}

impl AvailabilityDecision {
    /// Empty decision: nothing to reconcile
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verdict for a value; `None` means no opinion
    #[must_use]
    pub fn get(&self, option: &str, value: &str) -> Option<bool> {
        self.options.get(option)?.get(value).copied()
    }

    /// Values known for an option
    #[must_use]
    pub fn values(&self, option: &str) -> Option<&BTreeMap<String, bool>> {
        self.options.get(option)
    }

    /// Option names, sorted
    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Whether there is nothing to reconcile
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// OR a stock signal into the verdict for a pair
    pub fn merge(&mut self, option: &str, value: &str, purchasable: bool) {
        let slot = self
            .options
            .entry(option.to_string())
            .or_default()
            .entry(value.to_string())
            .or_insert(false);
        *slot |= purchasable;
    }

    /// Values that cannot be bought, as `(option, value)` pairs
    #[must_use]
    pub fn unavailable(&self) -> Vec<(&str, &str)> {
        self.options
            .iter()
            .flat_map(|(option, values)| {
                values
                    .iter()
                    .filter(|(_, available)| !**available)
                    .map(move |(value, _)| (option.as_str(), value.as_str()))
            })
            .collect()
    }
}

/// Build a decision from raw combination records.
///
/// A value is purchasable when any combination containing it is in stock,
/// even if other combinations with the same value are not. Dependent options
/// (size available only in some colours) are deliberately not modelled.
#[must_use]
pub fn build(records: &[CombinationRecord]) -> AvailabilityDecision {
    let mut decision = AvailabilityDecision::new();
    for record in records {
        let purchasable = record.is_purchasable();
        for pair in &record.options {
            if let (Some(name), Some(value)) = (&pair.name, &pair.value) {
                decision.merge(name, value, purchasable);
            }
        }
    }
    decision
}
