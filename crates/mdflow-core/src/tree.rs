//! Nested CP2K parameter trees and the deep merge used to layer them.
//!
//! Merge semantics:
//! - Mappings: deep-merge by key (recursive)
//! - Lists: REPLACE (overlay wins entirely)
//! - Scalars: override (overlay wins)

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A leaf value in a parameter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(true) => write!(f, ".TRUE."),
            Self::Bool(false) => write!(f, ".FALSE."),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// A node in a parameter tree.
///
/// Only `Mapping` nodes take part in a deep merge; scalars and lists are
/// always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(Scalar),
    List(Vec<ParamValue>),
    Mapping(ParamTree),
}

impl ParamValue {
    pub fn as_mapping(&self) -> Option<&ParamTree> {
        match self {
            Self::Mapping(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Parses a command-line literal: `true`/`false`, integers, finite floats,
    /// anything else (including `nan` and `inf`) is kept as text.
    pub fn parse_literal(text: &str) -> Self {
        let trimmed = text.trim();
        let scalar = match trimmed.to_ascii_lowercase().as_str() {
            "true" | ".true." => Scalar::Bool(true),
            "false" | ".false." => Scalar::Bool(false),
            _ => {
                if let Ok(value) = trimmed.parse::<i64>() {
                    Scalar::Int(value)
                } else if let Some(value) =
                    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
                {
                    Scalar::Float(value)
                } else {
                    Scalar::Text(trimmed.to_string())
                }
            }
        };
        Self::Scalar(scalar)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::Text(value.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::Text(value))
    }
}

impl From<ParamTree> for ParamValue {
    fn from(value: ParamTree) -> Self {
        Self::Mapping(value)
    }
}

/// A mapping from CP2K keywords/sections to values. Keys are kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTree(BTreeMap<String, ParamValue>);

impl ParamTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used for the static default trees.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a value by a path of keys, descending through mappings.
    pub fn get_path(&self, path: &[&str]) -> Option<&ParamValue> {
        let (last, parents) = path.split_last()?;
        let mut node = self;
        for key in parents {
            node = node.get(key)?.as_mapping()?;
        }
        node.get(last)
    }

    /// Sets a value at a path of keys, creating (or replacing non-mapping
    /// values with) intermediate mappings as needed. Whatever was stored at
    /// the final key is replaced, mappings included.
    pub fn set_path(&mut self, path: &[&str], value: ParamValue) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.insert(*first, value);
            return;
        }

        let entry = self
            .0
            .entry((*first).to_string())
            .or_insert_with(|| ParamValue::Mapping(ParamTree::new()));
        match entry {
            ParamValue::Mapping(child) => child.set_path(rest, value),
            other => {
                let mut child = ParamTree::new();
                child.set_path(rest, value);
                *other = ParamValue::Mapping(child);
            }
        }
    }

    /// Key path of the first float that is NaN or infinite, if any.
    pub fn find_non_finite(&self) -> Option<String> {
        fn walk(value: &ParamValue, path: &str) -> Option<String> {
            match value {
                ParamValue::Scalar(Scalar::Float(v)) if !v.is_finite() => Some(path.to_string()),
                ParamValue::Scalar(_) => None,
                ParamValue::List(items) => items
                    .iter()
                    .enumerate()
                    .find_map(|(i, item)| walk(item, &format!("{path}[{i}]"))),
                ParamValue::Mapping(tree) => tree.0.iter().find_map(|(key, child)| {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    walk(child, &child_path)
                }),
            }
        }

        self.0
            .iter()
            .find_map(|(key, value)| walk(value, key))
    }

    /// Merges `overlay` into this tree. See [`deep_merge`].
    pub fn merge(&mut self, overlay: &ParamTree) {
        deep_merge(self, overlay);
    }
}

impl FromIterator<(String, ParamValue)> for ParamTree {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deep merge `overlay` into `base` in place.
///
/// For every key of the overlay: when both sides hold a mapping the two
/// mappings are merged recursively, otherwise the overlay value replaces
/// whatever the base held (including whole sub-trees).
pub fn deep_merge(base: &mut ParamTree, overlay: &ParamTree) {
    for (key, overlay_value) in &overlay.0 {
        if let (Some(ParamValue::Mapping(base_child)), ParamValue::Mapping(overlay_child)) =
            (base.0.get_mut(key), overlay_value)
        {
            deep_merge(base_child, overlay_child);
            continue;
        }
        base.0.insert(key.clone(), overlay_value.clone());
    }
}

/// Merge multiple layers in order (first is base, last has highest precedence).
pub fn merge_layers<I>(layers: I) -> ParamTree
where
    I: IntoIterator<Item = ParamTree>,
{
    layers.into_iter().fold(ParamTree::new(), |mut acc, layer| {
        deep_merge(&mut acc, &layer);
        acc
    })
}
