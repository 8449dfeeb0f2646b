// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deviation trigger functions.
//!
//! A job with a deviation trigger carries a set of named threshold checks,
//! written as a JSON/TOML object `{"relativeThreshold": 0.01}`. The set
//! triggers if any member triggers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

/// `(current, new, threshold) -> triggered`
pub type ThresholdFn = fn(f64, f64, f64) -> bool;

/// Trigger when the change relative to `current` is at least `threshold`.
/// A zero `current` triggers on any non-zero `new`.
pub fn relative_threshold(current: f64, new: f64, threshold: f64) -> bool {
    if current == 0.0 {
        return new != 0.0;
    }
    ((current - new) / current).abs() >= threshold
}

/// Trigger when the absolute change is at least `threshold`
pub fn absolute_threshold(current: f64, new: f64, threshold: f64) -> bool {
    (current - new).abs() >= threshold
}

static REGISTRY: &[(&str, ThresholdFn)] =
    &[("relativeThreshold", relative_threshold), ("absoluteThreshold", absolute_threshold)];

pub fn lookup(name: &str) -> Option<(&'static str, ThresholdFn)> {
    REGISTRY.iter().find(|(n, _)| *n == name).copied()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("unknown trigger function: {0}")]
    UnknownFunction(String),
    #[error("parameter for {name} must be a number, got {got}")]
    NotANumber { name: String, got: String },
    #[error("trigger functions must be an object of name to threshold")]
    NotAnObject,
}

/// One named check bound to its threshold parameter
#[derive(Clone, Copy)]
pub struct TriggerFn {
    name: &'static str,
    func: ThresholdFn,
    threshold: f64,
}

impl TriggerFn {
    pub fn new(name: &str, threshold: f64) -> Result<Self, ThresholdError> {
        let (name, func) =
            lookup(name).ok_or_else(|| ThresholdError::UnknownFunction(name.to_string()))?;
        if !threshold.is_finite() {
            return Err(ThresholdError::NotANumber {
                name: name.to_string(),
                got: threshold.to_string(),
            });
        }
        Ok(Self { name, func, threshold })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_triggered(&self, current: f64, new: f64) -> bool {
        (self.func)(current, new, self.threshold)
    }
}

impl std::fmt::Debug for TriggerFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.threshold)
    }
}

impl PartialEq for TriggerFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.threshold == other.threshold
    }
}

/// A set of trigger functions, at most one per name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerFns(Vec<TriggerFn>);

impl TriggerFns {
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, ThresholdError> {
        let obj = raw.as_object().ok_or(ThresholdError::NotAnObject)?;
        Self::from_pairs(obj.iter().map(|(k, v)| (k.as_str(), v)))
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (&'a str, &'a serde_json::Value)>,
    ) -> Result<Self, ThresholdError> {
        let mut fns = Vec::new();
        for (name, param) in pairs {
            let threshold = param.as_f64().ok_or_else(|| ThresholdError::NotANumber {
                name: name.to_string(),
                got: param.to_string(),
            })?;
            fns.push(TriggerFn::new(name, threshold)?);
        }
        fns.sort_by_key(|f| f.name);
        Ok(Self(fns))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TriggerFn> {
        self.0.iter()
    }

    /// True if any member triggers
    pub fn is_triggered(&self, current: f64, new: f64) -> bool {
        self.0.iter().any(|f| f.is_triggered(current, new))
    }
}

impl FromIterator<TriggerFn> for TriggerFns {
    fn from_iter<I: IntoIterator<Item = TriggerFn>>(iter: I) -> Self {
        let mut by_name: BTreeMap<&'static str, TriggerFn> = BTreeMap::new();
        for f in iter {
            by_name.insert(f.name, f);
        }
        Self(by_name.into_values().collect())
    }
}

impl Serialize for TriggerFns {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for f in &self.0 {
            map.serialize_entry(f.name, &f.threshold)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TriggerFns {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(d)?;
        Self::from_pairs(raw.iter().map(|(k, v)| (k.as_str(), v))).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "threshold_tests.rs"]
mod tests;
