use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Substituted for partition fields that arrive null, absent or unusable.
pub const UNKNOWN_PARTITION_VALUE: &str = "unknown";

/// One field of a raw event. Upstream payloads are loosely typed, so a
/// field can be a string, null, missing entirely, or some other JSON
/// value. Keeping the last case as `Malformed` instead of failing the
/// event decode makes the defaulting rules total.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Field {
    Present(String),
    #[default]
    Absent,
    Malformed,
}

impl Field {
    pub fn present(value: impl Into<String>) -> Self {
        Field::Present(value.into())
    }

    /// The field as an optional value; anything not a proper string is None.
    pub fn into_option(self) -> Option<String> {
        match self {
            Field::Present(value) => Some(value),
            Field::Absent | Field::Malformed => None,
        }
    }

    /// The field as a partition value, substituting `unknown` for anything
    /// not a proper string. Sanitization happens separately.
    fn into_partition_value(self) -> String {
        match self {
            Field::Present(value) => value,
            Field::Absent | Field::Malformed => UNKNOWN_PARTITION_VALUE.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => Field::Absent,
            Some(serde_json::Value::String(value)) => Field::Present(value),
            Some(_) => Field::Malformed,
        })
    }
}

impl Serialize for Field {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Field::Present(value) => serializer.serialize_str(value),
            Field::Absent | Field::Malformed => serializer.serialize_none(),
        }
    }
}

/// A user-profile event as decoded off the wire. Every field is optional
/// and untrusted; redeliveries mean the same event can be seen more than
/// once. A payload that fails to decode entirely becomes the all-absent
/// default.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default)]
pub struct RawEvent {
    pub id: Field,
    pub firstname: Field,
    pub lastname: Field,
    pub email: Field,
    pub phone: Field,
    pub dob: Field,
    pub address: Field,
    pub city: Field,
    pub state: Field,
    pub zipcode: Field,
    pub country: Field,
}

impl RawEvent {
    /// Map the raw event into the canonical record: stamp the ingestion
    /// time, default missing partition fields to `unknown`, and sanitize
    /// them for use as storage path segments.
    pub fn normalize(self, ingestion_time: DateTime<Utc>) -> UserRecord {
        UserRecord {
            id: self.id.into_option(),
            firstname: self.firstname.into_option(),
            lastname: self.lastname.into_option(),
            email: self.email.into_option(),
            phone: self.phone.into_option(),
            dob: self.dob.into_option(),
            address: self.address.into_option(),
            zipcode: self.zipcode.into_option(),
            city: sanitize_partition_value(&self.city.into_partition_value()),
            state: sanitize_partition_value(&self.state.into_partition_value()),
            country: sanitize_partition_value(&self.country.into_partition_value()),
            ingestion_time,
        }
    }
}

/// The normalized record written to the table store. The partition fields
/// `country`, `state` and `city` are never null and contain only
/// characters from `[A-Za-z0-9_-]`.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct UserRecord {
    pub id: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub address: Option<String>,
    pub zipcode: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub ingestion_time: DateTime<Utc>,
}

impl UserRecord {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            country: self.country.clone(),
            state: self.state.clone(),
            city: self.city.clone(),
        }
    }
}

/// The `(country, state, city)` tuple a record is laid out under.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub country: String,
    pub state: String,
    pub city: String,
}

impl PartitionKey {
    /// Directory path of this partition, relative to the table base path.
    /// Safe as path segments because the components are sanitized.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "country={}/state={}/city={}",
            self.country, self.state, self.city
        ))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.country, self.state, self.city)
    }
}

/// Rewrite everything outside `[A-Za-z0-9_-]` to `_`, so partition values
/// cannot introduce path separators or control characters. Idempotent.
pub fn sanitize_partition_value(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_partition_value("Los Angeles"), "Los_Angeles");
        assert_eq!(sanitize_partition_value("Delhi!"), "Delhi_");
        assert_eq!(sanitize_partition_value("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_partition_value("são-paulo"), "s_o-paulo");
        assert_eq!(sanitize_partition_value("ok_AZ-09"), "ok_AZ-09");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["Los Angeles", "Delhi!", "a/b\\c", "tab\there", "", "日本"] {
            let once = sanitize_partition_value(raw);
            assert_eq!(sanitize_partition_value(&once), once);
            assert!(once
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }

    #[test]
    fn field_decodes_null_missing_and_non_string() {
        let event: RawEvent = serde_json::from_value(json!({
            "id": "abc",
            "country": null,
            "zipcode": 110001,
            "phone": ["not", "a", "string"]
        }))
        .unwrap();

        assert_eq!(event.id, Field::Present("abc".to_string()));
        assert_eq!(event.country, Field::Absent);
        assert_eq!(event.city, Field::Absent); // missing key
        assert_eq!(event.zipcode, Field::Malformed);
        assert_eq!(event.phone, Field::Malformed);
    }

    #[test]
    fn normalize_defaults_and_sanitizes_partition_fields() {
        let event: RawEvent = serde_json::from_value(json!({
            "country": "India",
            "state": null,
            "city": "Delhi!"
        }))
        .unwrap();
        let record = event.normalize(Utc::now());

        assert_eq!(record.country, "India");
        assert_eq!(record.state, UNKNOWN_PARTITION_VALUE);
        assert_eq!(record.city, "Delhi_");
    }

    #[test]
    fn normalize_treats_malformed_partition_fields_as_unknown() {
        let event: RawEvent = serde_json::from_value(json!({
            "country": 42,
            "state": {"nested": true},
            "city": "Pune"
        }))
        .unwrap();
        let record = event.normalize(Utc::now());

        assert_eq!(record.country, UNKNOWN_PARTITION_VALUE);
        assert_eq!(record.state, UNKNOWN_PARTITION_VALUE);
        assert_eq!(record.city, "Pune");
    }

    #[test]
    fn partition_key_path_layout() {
        let event: RawEvent = serde_json::from_value(json!({
            "country": "USA",
            "state": "CA",
            "city": "Los Angeles"
        }))
        .unwrap();
        let key = event.normalize(Utc::now()).partition_key();
        assert_eq!(
            key.relative_path(),
            PathBuf::from("country=USA/state=CA/city=Los_Angeles")
        );
    }
}
