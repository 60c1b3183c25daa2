use crate::sig::FieldType;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// AttrValue
///
/// A field-attribute value as it appears in signatures and hints. The wire
/// form is untagged JSON; `Null` round-trips as JSON `null`.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttrValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether the value counts as "set" for nullability checks.
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl Display for AttrValue {
    /// Canonical hint form: single-quoted strings, `True`/`False`/`None`
    /// literals, bare integers. This rendering is load-bearing for hint
    /// stability and must not change.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

///
/// AttrList
///
/// Sparse, insertion-ordered attribute map for a field signature. Only
/// attributes whose value differs from the field type's default are stored.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttrList(Vec<(String, AttrValue)>);

impl AttrList {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn get(&self, attr_name: &str) -> Option<&AttrValue> {
        self.0
            .iter()
            .find(|(name, _)| name == attr_name)
            .map(|(_, value)| value)
    }

    /// Insert or replace an attribute, preserving its original position on
    /// replacement.
    pub fn set(&mut self, attr_name: impl Into<String>, value: AttrValue) {
        let attr_name = attr_name.into();

        match self.0.iter_mut().find(|(name, _)| *name == attr_name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((attr_name, value)),
        }
    }

    /// Remove an attribute, returning its previous value if it was set.
    pub fn remove(&mut self, attr_name: &str) -> Option<AttrValue> {
        let pos = self.0.iter().position(|(name, _)| name == attr_name)?;

        Some(self.0.remove(pos).1)
    }

    #[must_use]
    pub fn contains(&self, attr_name: &str) -> bool {
        self.get(attr_name).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// All attribute names set on this list.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl FromIterator<(String, AttrValue)> for AttrList {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        let mut attrs = Self::new();

        for (name, value) in iter {
            attrs.set(name, value);
        }

        attrs
    }
}

//
// Attribute defaults
//
// Two-level lookup: a field-type-specific table overrides the global '*'
// table. Attributes absent from both levels have no schema-relevant default
// and are always stored explicitly.
//

const GLOBAL_DEFAULTS: &[(&str, AttrValue)] = &[
    ("primary_key", AttrValue::Bool(false)),
    ("max_length", AttrValue::Null),
    ("unique", AttrValue::Bool(false)),
    ("null", AttrValue::Bool(false)),
    ("db_index", AttrValue::Bool(false)),
    ("db_column", AttrValue::Null),
    ("db_tablespace", AttrValue::Null),
];

const DECIMAL_DEFAULTS: &[(&str, AttrValue)] = &[
    ("max_digits", AttrValue::Null),
    ("decimal_places", AttrValue::Null),
];

const RELATION_DEFAULTS: &[(&str, AttrValue)] = &[("db_index", AttrValue::Bool(true))];

const MANY_TO_MANY_DEFAULTS: &[(&str, AttrValue)] = &[("db_table", AttrValue::Null)];

/// Type-specific default overrides for a field type, if any.
const fn type_defaults(field_type: FieldType) -> &'static [(&'static str, AttrValue)] {
    match field_type {
        FieldType::DecimalField => DECIMAL_DEFAULTS,
        FieldType::ForeignKey | FieldType::OneToOneField => RELATION_DEFAULTS,
        FieldType::ManyToManyField => MANY_TO_MANY_DEFAULTS,
        _ => &[],
    }
}

/// Resolve the default value for an attribute on a field type.
///
/// Checks the type-specific table first, then the global table. Returns
/// `None` for attributes unknown to both.
#[must_use]
pub fn attr_default(field_type: FieldType, attr_name: &str) -> Option<&'static AttrValue> {
    type_defaults(field_type)
        .iter()
        .chain(GLOBAL_DEFAULTS)
        .find(|(name, _)| *name == attr_name)
        .map(|(_, value)| value)
}

/// All attribute names that carry a schema-relevant default for a type.
pub fn attr_names_for_type(field_type: FieldType) -> impl Iterator<Item = &'static str> {
    GLOBAL_DEFAULTS
        .iter()
        .chain(type_defaults(field_type))
        .map(|(name, _)| *name)
}

//
// Attribute aliases
//
// Historical wire names accepted on deserialization. Old records keep
// loading while the serialized form stays on the modern key.
//

const ATTRIBUTE_ALIASES: &[(&str, &str)] = &[
    // The uniqueness flag was recorded under an internal `_unique` key in
    // legacy records.
    ("unique", "_unique"),
    // Relations were once recorded under `rel` rather than `related_model`.
    ("related_model", "rel"),
];

/// The legacy wire alias for an attribute, if one exists.
#[must_use]
pub fn attr_alias(attr_name: &str) -> Option<&'static str> {
    ATTRIBUTE_ALIASES
        .iter()
        .find(|(name, _)| *name == attr_name)
        .map(|(_, alias)| *alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_default_prefers_type_specific_table() {
        let db_index = attr_default(FieldType::ForeignKey, "db_index").unwrap();
        assert_eq!(db_index, &AttrValue::Bool(true));

        let db_index = attr_default(FieldType::IntegerField, "db_index").unwrap();
        assert_eq!(db_index, &AttrValue::Bool(false));
    }

    #[test]
    fn attr_default_falls_back_to_global_table() {
        let null = attr_default(FieldType::DecimalField, "null").unwrap();
        assert_eq!(null, &AttrValue::Bool(false));

        assert_eq!(
            attr_default(FieldType::DecimalField, "max_digits"),
            Some(&AttrValue::Null)
        );
        assert_eq!(attr_default(FieldType::IntegerField, "max_digits"), None);
    }

    #[test]
    fn attr_list_set_replaces_in_place() {
        let mut attrs = AttrList::new();
        attrs.set("null", AttrValue::Bool(true));
        attrs.set("max_length", AttrValue::Int(32));
        attrs.set("null", AttrValue::Bool(false));

        let names: Vec<_> = attrs.names().collect();
        assert_eq!(names, vec!["null", "max_length"]);
        assert_eq!(attrs.get("null"), Some(&AttrValue::Bool(false)));
    }

    #[test]
    fn attr_value_hint_rendering() {
        assert_eq!(AttrValue::Null.to_string(), "None");
        assert_eq!(AttrValue::Bool(true).to_string(), "True");
        assert_eq!(AttrValue::Int(42).to_string(), "42");
        assert_eq!(AttrValue::from("abc's").to_string(), "'abc\\'s'");
    }

    #[test]
    fn attr_value_null_round_trips_as_json_null() {
        let json = serde_json::to_value(AttrValue::Null).unwrap();
        assert!(json.is_null());

        let back: AttrValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, AttrValue::Null);
    }
}
