use crate::sig::{
    SignatureError,
    attrs::{AttrList, AttrValue, attr_alias, attr_default, attr_names_for_type},
};
use derive_more::{Display, FromStr};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

///
/// FieldType
///
/// The closed vocabulary of supported column kinds. Wire and hint forms use
/// the variant name verbatim.
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, FromStr, PartialEq, Serialize)]
pub enum FieldType {
    AutoField,
    BigIntegerField,
    BooleanField,
    CharField,
    DateField,
    DateTimeField,
    DecimalField,
    FloatField,
    ForeignKey,
    IntegerField,
    ManyToManyField,
    OneToOneField,
    PositiveIntegerField,
    SmallIntegerField,
    TextField,
}

impl FieldType {
    /// The underlying column semantics for the type. Two field types whose
    /// storage kinds match are interchangeable at the schema level.
    #[must_use]
    pub const fn storage(self) -> StorageKind {
        match self {
            Self::AutoField => StorageKind::Serial,
            Self::BigIntegerField => StorageKind::BigInt,
            Self::BooleanField => StorageKind::Bool,
            Self::CharField => StorageKind::VarChar,
            Self::DateField => StorageKind::Date,
            Self::DateTimeField => StorageKind::Timestamp,
            Self::DecimalField => StorageKind::Decimal,
            Self::FloatField => StorageKind::Double,
            Self::ForeignKey | Self::OneToOneField => StorageKind::ForeignKey,
            Self::IntegerField | Self::PositiveIntegerField => StorageKind::Int,
            Self::ManyToManyField => StorageKind::JoinTable,
            Self::SmallIntegerField => StorageKind::SmallInt,
            Self::TextField => StorageKind::Text,
        }
    }

    /// Whether the type references another model.
    #[must_use]
    pub const fn is_relation(self) -> bool {
        matches!(
            self,
            Self::ForeignKey | Self::ManyToManyField | Self::OneToOneField
        )
    }

    #[must_use]
    pub const fn is_many_to_many(self) -> bool {
        matches!(self, Self::ManyToManyField)
    }
}

///
/// StorageKind
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageKind {
    BigInt,
    Bool,
    Date,
    Decimal,
    Double,
    ForeignKey,
    Int,
    /// Backed by a join table, not a column on the model's own table.
    JoinTable,
    Serial,
    SmallInt,
    Text,
    Timestamp,
    VarChar,
}

///
/// FieldSignature
///
/// Schema state for one field: name, type, the sparse attribute map, and
/// the relational target for relation types.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSignature {
    pub field_name: String,
    pub field_type: FieldType,
    attrs: AttrList,
    pub related_model: Option<String>,
}

impl FieldSignature {
    #[must_use]
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            attrs: AttrList::new(),
            related_model: None,
        }
    }

    /// Builder form used when constructing signatures by hand.
    #[must_use]
    pub fn with_attr(mut self, attr_name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.set(attr_name, value.into());
        self
    }

    #[must_use]
    pub fn with_related_model(mut self, related_model: impl Into<String>) -> Self {
        self.related_model = Some(related_model.into());
        self
    }

    /// The value for an attribute, falling back to the type's default when
    /// it is not explicitly set. `None` means the attribute is unknown for
    /// this type and unset.
    #[must_use]
    pub fn attr_value(&self, attr_name: &str) -> Option<AttrValue> {
        self.attrs
            .get(attr_name)
            .cloned()
            .or_else(|| self.attr_default(attr_name).cloned())
    }

    /// The default value for an attribute on this field's type.
    #[must_use]
    pub fn attr_default(&self, attr_name: &str) -> Option<&'static AttrValue> {
        attr_default(self.field_type, attr_name)
    }

    /// The explicitly-set value for an attribute, ignoring defaults.
    #[must_use]
    pub fn explicit_attr(&self, attr_name: &str) -> Option<&AttrValue> {
        self.attrs.get(attr_name)
    }

    /// Every explicitly-set attribute, in insertion order.
    pub fn explicit_attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter()
    }

    pub fn set_attr(&mut self, attr_name: &str, value: AttrValue) {
        self.attrs.set(attr_name, value);
    }

    pub fn clear_attr(&mut self, attr_name: &str) -> Option<AttrValue> {
        self.attrs.remove(attr_name)
    }

    /// Whether an attribute currently resolves to its default value.
    #[must_use]
    pub fn is_attr_value_default(&self, attr_name: &str) -> bool {
        match self.attrs.get(attr_name) {
            Some(value) => Some(value) == self.attr_default(attr_name),
            None => true,
        }
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.attr_value("primary_key")
            .is_some_and(|v| v.is_truthy())
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.attr_value("null").is_some_and(|v| v.is_truthy())
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.attr_value("unique").is_some_and(|v| v.is_truthy())
    }

    #[must_use]
    pub fn has_index(&self) -> bool {
        self.attr_value("db_index").is_some_and(|v| v.is_truthy())
    }

    /// The column backing this field. Relations take an `_id` suffix unless
    /// an explicit column name is set; many-to-many fields have no column.
    #[must_use]
    pub fn column_name(&self) -> String {
        if let Some(AttrValue::Str(column)) = self.explicit_attr("db_column") {
            return column.clone();
        }

        match self.field_type {
            FieldType::ForeignKey | FieldType::OneToOneField => format!("{}_id", self.field_name),
            _ => self.field_name.clone(),
        }
    }

    /// The join table for a many-to-many field, derived from the owning
    /// model's table unless an explicit table name is set.
    #[must_use]
    pub fn m2m_table_name(&self, model_table: &str) -> String {
        if let Some(AttrValue::Str(table)) = self.explicit_attr("db_table") {
            return table.clone();
        }

        format!("{model_table}_{}", self.field_name)
    }

    /// Diff against an older field signature, returning the sorted list of
    /// changed attribute names.
    ///
    /// Two pseudo-attributes are reported alongside real ones: `field_type`
    /// (only when the underlying storage semantics differ) and
    /// `related_model` (whenever the relational target differs).
    #[must_use]
    pub fn diff(&self, old_field_sig: &Self) -> Vec<String> {
        let mut changed_attrs: Vec<String> = old_field_sig
            .attrs
            .names()
            .chain(self.attrs.names())
            .filter(|attr| self.attr_value(attr) != old_field_sig.attr_value(attr))
            .map(str::to_string)
            .collect();

        changed_attrs.sort_unstable();
        changed_attrs.dedup();

        if self.field_type != old_field_sig.field_type
            && self.field_type.storage() != old_field_sig.field_type.storage()
        {
            changed_attrs.push("field_type".to_string());
        }

        if self.related_model != old_field_sig.related_model {
            changed_attrs.push("related_model".to_string());
        }

        changed_attrs.sort_unstable();
        changed_attrs
    }

    /// Serialize to the versioned wire form.
    #[must_use]
    pub fn serialize(&self, _sig_version: u32) -> JsonValue {
        let mut map = Map::new();
        map.insert(
            "field_type".to_string(),
            JsonValue::String(self.field_type.to_string()),
        );

        for (name, value) in self.attrs.iter() {
            map.insert(
                name.to_string(),
                serde_json::to_value(value).unwrap_or(JsonValue::Null),
            );
        }

        if let Some(related_model) = &self.related_model {
            map.insert(
                "related_model".to_string(),
                JsonValue::String(related_model.clone()),
            );
        }

        JsonValue::Object(map)
    }

    /// Deserialize from the versioned wire form. Legacy attribute aliases
    /// are honoured so old records keep loading.
    pub fn deserialize(
        field_name: &str,
        field_sig_value: &JsonValue,
        _sig_version: u32,
    ) -> Result<Self, SignatureError> {
        let map = field_sig_value
            .as_object()
            .ok_or_else(|| SignatureError::malformed(format!("field \"{field_name}\"")))?;

        let field_type: FieldType = map
            .get("field_type")
            .and_then(JsonValue::as_str)
            .and_then(|name| name.parse().ok())
            .ok_or_else(|| {
                SignatureError::malformed(format!("field type for \"{field_name}\""))
            })?;

        let lookup = |attr: &str| -> Option<&JsonValue> {
            map.get(attr)
                .or_else(|| attr_alias(attr).and_then(|alias| map.get(alias)))
        };

        let mut field_sig = Self::new(field_name, field_type);

        for attr in attr_names_for_type(field_type) {
            if let Some(value) = lookup(attr) {
                let value: AttrValue = serde_json::from_value(value.clone())
                    .map_err(|_| SignatureError::malformed(format!("attribute \"{attr}\"")))?;
                field_sig.set_attr(attr, value);
            }
        }

        field_sig.related_model = lookup("related_model")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        Ok(field_sig)
    }
}
