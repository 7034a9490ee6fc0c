use crate::value::Value;
use std::collections::BTreeMap;

///
/// Record
///
/// One instance of a schema: a field-name → value mapping. Nested fields
/// hold nested `Record`s by value at this boundary; storage replaces them
/// with pointers during flattening.
///
/// Field order is not significant; a `BTreeMap` keeps iteration
/// deterministic so flattened output and fingerprints are stable.
///

/// Equality treats an absent field and an explicit `Null` as the same
/// thing, mirroring the wire format (both are an omitted hash field), so
/// `unflatten(flatten(r))` compares equal to `r` however the caller spelled
/// the absence.
#[derive(Clone, Debug, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let names: std::collections::BTreeSet<&str> = self
            .fields
            .keys()
            .chain(other.fields.keys())
            .map(String::as_str)
            .collect();

        names.into_iter().all(|name| {
            let a = self.fields.get(name).unwrap_or(&Value::Null);
            let b = other.fields.get(name).unwrap_or(&Value::Null);
            a == b
        })
    }
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder-style.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The field's value, with absence collapsed to `Null`.
    #[must_use]
    pub fn get_or_null(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
