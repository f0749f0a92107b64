use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Name of the reserved identifier field.
pub const ID_FIELD: &str = "id";

/// A single document in a collection.
///
/// `id` is the only reserved key. Everything else the caller sends lands in `fields`
/// untouched, so a record round-trips as one flat JSON object. Stored documents whose
/// `id` is missing or not a positive integer fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "positive_id")]
    pub id: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Build a record from a caller payload. A caller-supplied `id` is discarded.
    pub fn new(id: u64, mut fields: Map<String, Value>) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    /// Shallow merge: top-level keys in `patch` overwrite, everything else is kept.
    /// Nested values are replaced wholesale. `id` in the patch is ignored.
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            if key == ID_FIELD {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    /// The upload filename stored under `field`, if it holds a non-empty string.
    pub fn file_name(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn into_value(self) -> Value {
        let mut object = self.fields;
        object.insert(ID_FIELD.to_string(), Value::from(self.id));
        Value::Object(object)
    }
}

fn positive_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match u64::deserialize(deserializer)? {
        0 => Err(D::Error::custom("id must be a positive integer")),
        id => Ok(id),
    }
}

/// Next identifier for a collection: `max(id) + 1`, or `1` when empty.
/// Input order does not matter. `None` once the id space is exhausted.
pub fn next_id(records: &[Record]) -> Option<u64> {
    match records.iter().map(|r| r.id).max() {
        Some(max) => max.checked_add(1),
        None => Some(1),
    }
}
