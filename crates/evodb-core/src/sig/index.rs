use crate::sig::SignatureError;
use serde_json::{Map, Value as JsonValue};

///
/// IndexSignature
///
/// An explicit index declared on a model: an ordered field list and an
/// optional name. Equality treats an unset name and an empty name alike.
///

#[derive(Clone, Debug)]
pub struct IndexSignature {
    pub fields: Vec<String>,
    pub name: Option<String>,
}

impl IndexSignature {
    #[must_use]
    pub fn new(fields: Vec<String>, name: Option<String>) -> Self {
        Self { fields, name }
    }

    #[must_use]
    pub fn serialize(&self, _sig_version: u32) -> JsonValue {
        let mut map = Map::new();
        map.insert(
            "fields".to_string(),
            JsonValue::Array(
                self.fields
                    .iter()
                    .map(|f| JsonValue::String(f.clone()))
                    .collect(),
            ),
        );

        if let Some(name) = &self.name {
            if !name.is_empty() {
                map.insert("name".to_string(), JsonValue::String(name.clone()));
            }
        }

        JsonValue::Object(map)
    }

    pub fn deserialize(
        index_sig_value: &JsonValue,
        _sig_version: u32,
    ) -> Result<Self, SignatureError> {
        let map = index_sig_value
            .as_object()
            .ok_or_else(|| SignatureError::malformed("index entry"))?;

        let fields = map
            .get("fields")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SignatureError::malformed("index field list"))?
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SignatureError::malformed("index field name"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let name = map
            .get("name")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        Ok(Self::new(fields, name))
    }
}

impl PartialEq for IndexSignature {
    fn eq(&self, other: &Self) -> bool {
        let self_name = self.name.as_deref().unwrap_or_default();
        let other_name = other.name.as_deref().unwrap_or_default();

        self_name == other_name && self.fields == other.fields
    }
}

impl Eq for IndexSignature {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_unset_vs_empty_name() {
        let unnamed = IndexSignature::new(vec!["a".to_string()], None);
        let empty = IndexSignature::new(vec!["a".to_string()], Some(String::new()));
        let named = IndexSignature::new(vec!["a".to_string()], Some("idx_a".to_string()));

        assert_eq!(unnamed, empty);
        assert_ne!(unnamed, named);
    }

    #[test]
    fn empty_name_is_not_serialized() {
        let index_sig = IndexSignature::new(vec!["a".to_string()], Some(String::new()));
        let wire = index_sig.serialize(1);

        assert!(wire.get("name").is_none());

        let back = IndexSignature::deserialize(&wire, 1).unwrap();
        assert_eq!(back, index_sig);
    }
}
