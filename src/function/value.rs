use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::{Error, Result},
    identifier::Identifier,
    paths::write_atomically,
    provenance::Provenance,
    remote::Fetch,
};

use super::{Payload, ValueKind};

/// A materialized, zero-arity result. Values with a location are remote
/// values: their payload is persisted at that location.
#[derive(Clone)]
pub struct Value {
    payload: Payload,
    location: Option<Identifier>,
    provenance: Provenance,
    loaded_from_cache: bool,
}

/// Persisted form of a value, tagged with its kind so it can be rebuilt
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "class")]
enum Entry {
    Value { value: Payload },
    RemoteValue { value: Payload, uri: String },
}

impl Value {
    #[inline]
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            location: None,
            provenance: Provenance::default(),
            loaded_from_cache: false,
        }
    }

    #[inline]
    pub(crate) fn computed(payload: Payload, provenance: Provenance) -> Self {
        Self {
            payload,
            location: None,
            provenance,
            loaded_from_cache: false,
        }
    }

    #[inline]
    pub(crate) fn with_provenance(&self, provenance: Provenance) -> Self {
        Self {
            provenance,
            ..self.clone()
        }
    }

    #[inline]
    pub(crate) fn from_cache(mut self) -> Self {
        self.loaded_from_cache = true;
        self
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    #[inline]
    pub fn location(&self) -> Option<&Identifier> {
        self.location.as_ref()
    }

    #[inline]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Whether a caching strategy served this value without reducing anything
    #[inline]
    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self.location {
            Some(_) => ValueKind::RemoteValue,
            None => ValueKind::Value,
        }
    }

    /// Writes `payload` as JSON to `location`, which must be a `file://`
    /// identifier, and returns the remote value pointing at it.
    pub fn persist(location: Identifier, payload: Payload, provenance: Provenance) -> Result<Self> {
        let Some(path) = location.local_path() else {
            return Err(Error::UnsupportedScheme(location.scheme.as_str().to_string()));
        };
        write_atomically(&path, &serde_json::to_vec(&payload)?)?;
        log::info!("stored value to {location}");
        Ok(Self {
            payload,
            location: Some(location),
            provenance,
            loaded_from_cache: false,
        })
    }

    /// Reads back a remote value persisted at `location`
    pub fn load(location: Identifier, fetch: &dyn Fetch) -> Result<Self> {
        let bytes = fetch.fetch(&location)?;
        let payload = serde_json::from_slice(&bytes)?;
        Ok(Self {
            payload,
            location: Some(location),
            provenance: Provenance::default(),
            loaded_from_cache: false,
        })
    }

    fn to_entry(&self) -> Entry {
        let value = self.payload.clone();
        match &self.location {
            Some(uri) => Entry::RemoteValue {
                value,
                uri: uri.to_string(),
            },
            None => Entry::Value { value },
        }
    }

    /// Serializes the value as a `{"class": ..., "value": ...}` entry
    pub fn dumps(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_entry())?)
    }

    /// Rebuilds a value from an entry written by [`Value::dumps`], attaching
    /// `provenance` to it
    pub fn loads(s: &str, provenance: Provenance) -> Result<Self> {
        let (payload, location) = match serde_json::from_str(s)? {
            Entry::Value { value } => (value, None),
            Entry::RemoteValue { value, uri } => (value, Some(Identifier::parse(&uri)?)),
        };
        Ok(Self {
            payload,
            location,
            provenance,
            loaded_from_cache: false,
        })
    }
}

fn repr_lim(payload: &Payload, lim: usize) -> String {
    let s = payload.to_string();
    if s.chars().count() > lim {
        let head = s.chars().take(lim).collect::<String>();
        format!("{head}...({})", s.len())
    } else {
        s
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(uri) => write!(
                f,
                "[RemoteValue: uri: {uri} value: {}]",
                repr_lim(&self.payload, 30)
            ),
            None => write!(f, "[Value: {}]", repr_lim(&self.payload, 30)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.location == other.location
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::{remote::DefaultFetcher, test_utils::HomeDir};

    #[test]
    fn test_dumps() {
        let v = Value::new(json!(123));
        expect![[r#"{"class":"Value","value":123}"#]].assert_eq(&v.dumps().unwrap());
        assert_eq!(
            Value::loads(&v.dumps().unwrap(), Provenance::default())
                .unwrap()
                .payload(),
            &json!(123)
        );
    }

    #[test]
    fn test_nested_round_trip() {
        let payload = json!({"output_values": {"y": 2, "series": [1.5, null, "x"]}, "ok": true});
        let v = Value::new(payload.clone());
        let back = Value::loads(&v.dumps().unwrap(), Provenance::default()).unwrap();
        assert_eq!(back.payload(), &payload);
        assert_eq!(back.kind(), ValueKind::Value);
    }

    #[test]
    fn test_remote_entry_keeps_location() {
        let home = tempdir().unwrap();
        let location = Identifier::file(home.utf8_path().join("urifile.json").into_string());
        let v = Value::persist(location.clone(), json!("blababla"), Provenance::default()).unwrap();
        assert_eq!(v.kind(), ValueKind::RemoteValue);

        let back = Value::loads(&v.dumps().unwrap(), Provenance::default()).unwrap();
        assert_eq!(back.location(), Some(&location));

        let reread = Value::load(location, &DefaultFetcher).unwrap();
        assert_eq!(reread.payload(), v.payload());
    }

    #[test]
    fn test_persist_needs_file_scheme() {
        let location = Identifier::parse("https://example.org/v.json").unwrap();
        assert!(matches!(
            Value::persist(location, json!(1), Provenance::default()),
            Err(Error::UnsupportedScheme(ref s)) if s == "https"
        ));
    }

    #[test]
    fn test_debug_truncates() {
        let v = Value::new(json!("a".repeat(40)));
        expect![[r#"[Value: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa...(42)]"#]].assert_eq(&format!("{v:?}"));
    }
}
