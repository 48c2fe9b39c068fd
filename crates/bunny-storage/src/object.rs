use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Metadata record for a file or directory, as returned by list and describe.
///
/// Every field is optional on the wire. A record where none of the identifying
/// fields are set is the backend's "no metadata" sentinel, see [`Object::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Object {
    #[serde(deserialize_with = "null_as_default")]
    pub guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub storage_zone_name: String,
    /// Parent directory, including the zone: `/zone/dir/`.
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub object_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub length: u64,
    #[serde(with = "timestamp")]
    pub last_changed: Option<NaiveDateTime>,
    #[serde(deserialize_with = "null_as_default")]
    pub server_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub array_number: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_directory: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content_type: String,
    #[serde(with = "timestamp")]
    pub date_created: Option<NaiveDateTime>,
    #[serde(deserialize_with = "null_as_default")]
    pub storage_zone_id: u64,
    pub checksum: Option<String>,
    pub replicated_zones: Option<String>,
}

impl Object {
    pub fn name(&self) -> &str {
        &self.object_name
    }

    /// Size in bytes. Zero for directories.
    pub fn size(&self) -> u64 {
        self.length
    }

    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        self.last_changed
    }

    /// Parent path joined with the object name.
    pub fn full_path(&self) -> String {
        let mut full = self.path.clone();
        if !full.is_empty() && !full.ends_with('/') {
            full.push('/');
        }
        full.push_str(&self.object_name);
        full
    }

    /// True for the sentinel record: nothing identifies an object.
    pub fn is_empty(&self) -> bool {
        self.guid.is_empty() && self.object_name.is_empty() && self.path.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Backend timestamps carry no offset (`2024-05-01T10:20:30.123`); RFC 3339 is accepted too.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Some(ts));
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| Some(ts.naive_utc()))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    const LISTING: &str = r#"[
        {
            "Guid": "2b6f0e52-1d0a-4a0f-9b8e-6d1c9c3f7a11",
            "StorageZoneName": "zone",
            "Path": "/zone/dir/",
            "ObjectName": "f",
            "Length": 1048576,
            "LastChanged": "2024-05-01T10:20:30.123",
            "ServerId": 42,
            "ArrayNumber": 3,
            "IsDirectory": false,
            "UserId": "user-1",
            "ContentType": "",
            "DateCreated": "2024-05-01T10:20:29.5",
            "StorageZoneId": 1234,
            "Checksum": "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855",
            "ReplicatedZones": null
        },
        {
            "Guid": "9d1c",
            "Path": "/zone/dir/",
            "ObjectName": "sub",
            "Length": 0,
            "IsDirectory": true,
            "Checksum": null
        }
    ]"#;

    #[test]
    fn decode_listing() {
        let objects: Vec<Object> = serde_json::from_str(LISTING).unwrap();
        assert_eq!(objects.len(), 2);

        let file = &objects[0];
        assert_eq!(file.name(), "f");
        assert_eq!(file.size(), 1_048_576);
        assert_eq!(file.full_path(), "/zone/dir/f");
        assert!(!file.is_directory);
        assert_eq!(file.storage_zone_id, 1234);
        assert!(file.checksum.is_some());
        assert!(file.replicated_zones.is_none());
        let changed = file.last_modified().unwrap();
        assert_eq!(
            changed.date(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert_eq!(changed.nanosecond(), 123_000_000);

        let dir = &objects[1];
        assert!(dir.is_directory);
        assert_eq!(dir.size(), 0);
        assert!(dir.last_changed.is_none());
        assert!(dir.storage_zone_name.is_empty());
    }

    #[test]
    fn decode_rfc3339_timestamp() {
        let obj: Object =
            serde_json::from_str(r#"{"ObjectName":"a","LastChanged":"2024-05-01T10:20:30Z"}"#)
                .unwrap();
        assert_eq!(obj.last_changed.unwrap().hour(), 10);
    }

    #[test]
    fn null_fields_decode_as_defaults() {
        let obj: Object = serde_json::from_str(
            r#"{"Guid":null,"ObjectName":"a","UserId":null,"Length":null,"LastChanged":null}"#,
        )
        .unwrap();
        assert_eq!(obj.guid, "");
        assert_eq!(obj.length, 0);
        assert!(obj.last_changed.is_none());
    }

    #[test]
    fn unknown_fields_ignored() {
        let obj: Object =
            serde_json::from_str(r#"{"ObjectName":"a","SomethingNew":[1,2,3]}"#).unwrap();
        assert_eq!(obj.name(), "a");
    }

    #[test]
    fn empty_record_is_sentinel() {
        let obj: Object = serde_json::from_str("{}").unwrap();
        assert!(obj.is_empty());
        assert_eq!(obj, Object::default());

        let obj: Object = serde_json::from_str(r#"{"ObjectName":"a"}"#).unwrap();
        assert!(!obj.is_empty());
    }

    #[test]
    fn invalid_timestamp_rejected() {
        let res: Result<Object, _> = serde_json::from_str(r#"{"LastChanged":"yesterday"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn serialized_timestamp_roundtrips() {
        let objects: Vec<Object> = serde_json::from_str(LISTING).unwrap();
        let json = serde_json::to_string(&objects[0]).unwrap();
        assert!(json.contains(r#""LastChanged":"2024-05-01T10:20:30.123""#));
        let back: Object = serde_json::from_str(&json).unwrap();
        assert_eq!(back, objects[0]);
    }
}
