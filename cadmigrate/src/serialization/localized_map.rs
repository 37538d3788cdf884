//! Locale-keyed maps for names, descriptions and keywords of library elements.
//!
//! File representation, one entry per child (default entry without locale):
//!
//! ```text
//! (name "Resistor")
//! (name (locale "de_DE") "Widerstand")
//! ```
//!
//! The default value is stored apart from the localized entries, so there is no way to
//! end up with a map lacking it.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use super::convert::{FromSExpression, ToSExpression};
use super::sexpression::{SExpression, SchemaError};
use crate::types::ElementName;

/// Describes how a map is stored in a document.
pub trait MapPolicy {
    type Value: Clone + PartialEq + fmt::Debug + FromSExpression + ToSExpression;
    const TAG: &'static str;
    const KEY: &'static str;
}

/// Change caused by a mutating call, returned to the caller synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEvent {
    ElementAdded,
    ElementRemoved,
    ElementValueChanged,
}

pub struct LocalizedMap<P: MapPolicy> {
    default: P::Value,
    localized: BTreeMap<String, P::Value>,
    _policy: PhantomData<P>,
}

impl<P: MapPolicy> LocalizedMap<P> {
    pub fn new(default: P::Value) -> Self {
        Self {
            default,
            localized: BTreeMap::new(),
            _policy: PhantomData,
        }
    }

    /// Load all `P::TAG` children of `node`.
    ///
    /// Fails if a locale is defined twice or if there is no default entry.
    pub fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let key_path = format!("{}/@0", P::KEY);
        let mut default = None;
        let mut localized = BTreeMap::new();
        for child in node.children_named(P::TAG) {
            let (key, value) = if child.get_child("@0")?.is_list() {
                let key: String = child.deserialize(&key_path)?;
                (key, child.deserialize::<P::Value>("@1")?)
            } else {
                (String::new(), child.deserialize::<P::Value>("@0")?)
            };
            let duplicate = if key.is_empty() {
                default.replace(value).is_some()
            } else {
                localized.insert(key.clone(), value).is_some()
            };
            if duplicate {
                return Err(SchemaError::DuplicateKey {
                    tag: P::TAG.to_string(),
                    key,
                });
            }
        }
        let default = default.ok_or_else(|| SchemaError::MissingDefault(P::TAG.to_string()))?;
        Ok(Self {
            default,
            localized,
            _policy: PhantomData,
        })
    }

    /// All keys in file order; the default key `""` comes first.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once("").chain(self.localized.keys().map(String::as_str))
    }

    pub fn default_value(&self) -> &P::Value {
        &self.default
    }

    pub fn contains(&self, key: &str) -> bool {
        key.is_empty() || self.localized.contains_key(key)
    }

    pub fn try_get(&self, key: &str) -> Option<&P::Value> {
        if key.is_empty() {
            Some(&self.default)
        } else {
            self.localized.get(key)
        }
    }

    /// Value of the first locale in `locale_order` that exists, falling back to the
    /// default. Also returns the key which was used.
    pub fn value<S: AsRef<str>>(&self, locale_order: &[S]) -> (&P::Value, &str) {
        for locale in locale_order {
            let locale = locale.as_ref();
            if locale.is_empty() {
                break;
            }
            if let Some((key, value)) = self.localized.get_key_value(locale) {
                return (value, key);
            }
        }
        (&self.default, "")
    }

    pub fn set_default_value(&mut self, value: P::Value) -> Option<MapEvent> {
        self.insert("", value)
    }

    /// Add or overwrite an entry. Returns `None` if nothing changed.
    pub fn insert(&mut self, key: &str, value: P::Value) -> Option<MapEvent> {
        if key.is_empty() {
            if self.default == value {
                return None;
            }
            self.default = value;
            return Some(MapEvent::ElementValueChanged);
        }
        match self.localized.get_mut(key) {
            Some(existing) if *existing == value => None,
            Some(existing) => {
                *existing = value;
                Some(MapEvent::ElementValueChanged)
            }
            None => {
                self.localized.insert(key.to_string(), value);
                Some(MapEvent::ElementAdded)
            }
        }
    }

    /// Remove a localized entry. The default entry is not removable.
    pub fn remove(&mut self, key: &str) -> Option<MapEvent> {
        self.localized
            .remove(key)
            .map(|_| MapEvent::ElementRemoved)
    }

    /// Replace the whole content by `other`, returning all resulting events in order.
    pub fn assign(&mut self, other: &Self) -> Vec<(String, MapEvent)> {
        let mut events = Vec::new();
        let obsolete: Vec<String> = self
            .localized
            .keys()
            .filter(|key| !other.localized.contains_key(*key))
            .cloned()
            .collect();
        for key in obsolete {
            if let Some(event) = self.remove(&key) {
                events.push((key, event));
            }
        }
        for key in other.keys() {
            if let Some(value) = other.try_get(key) {
                if let Some(event) = self.insert(key, value.clone()) {
                    events.push((key.to_string(), event));
                }
            }
        }
        events
    }

    /// Entry nodes in canonical order, each followed by a line break.
    pub fn to_nodes(&self) -> Vec<SExpression> {
        let mut nodes = Vec::new();
        nodes.push(SExpression::list(P::TAG).with_child(self.default.to_sexpression()));
        nodes.push(SExpression::line_break());
        for (key, value) in &self.localized {
            nodes.push(
                SExpression::list(P::TAG)
                    .with_value(P::KEY, key.as_str())
                    .with_child(value.to_sexpression()),
            );
            nodes.push(SExpression::line_break());
        }
        nodes
    }

    /// Append all entries to `root`, each on its own line.
    pub fn serialize(&self, root: &mut SExpression) -> Result<(), SchemaError> {
        for node in self.to_nodes() {
            if node.is_line_break() {
                continue;
            }
            root.ensure_line_break()?;
            root.append_child(node)?;
        }
        root.ensure_line_break()
    }

    /// Rewrite the existing entries of `root` in canonical form, in place.
    pub fn replace_in(&self, root: &mut SExpression) -> Result<(), SchemaError> {
        root.replace_children_named(P::TAG, self.to_nodes())
    }
}

impl<P: MapPolicy> Clone for LocalizedMap<P> {
    fn clone(&self) -> Self {
        Self {
            default: self.default.clone(),
            localized: self.localized.clone(),
            _policy: PhantomData,
        }
    }
}

impl<P: MapPolicy> PartialEq for LocalizedMap<P> {
    fn eq(&self, other: &Self) -> bool {
        self.default == other.default && self.localized == other.localized
    }
}

impl<P: MapPolicy> fmt::Debug for LocalizedMap<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalizedMap")
            .field("tag", &P::TAG)
            .field("default", &self.default)
            .field("localized", &self.localized)
            .finish()
    }
}

pub struct NamePolicy;

impl MapPolicy for NamePolicy {
    type Value = ElementName;
    const TAG: &'static str = "name";
    const KEY: &'static str = "locale";
}

pub struct DescriptionPolicy;

impl MapPolicy for DescriptionPolicy {
    type Value = String;
    const TAG: &'static str = "description";
    const KEY: &'static str = "locale";
}

pub struct KeywordsPolicy;

impl MapPolicy for KeywordsPolicy {
    type Value = String;
    const TAG: &'static str = "keywords";
    const KEY: &'static str = "locale";
}

pub type LocalizedNameMap = LocalizedMap<NamePolicy>;
pub type LocalizedDescriptionMap = LocalizedMap<DescriptionPolicy>;
pub type LocalizedKeywordsMap = LocalizedMap<KeywordsPolicy>;
