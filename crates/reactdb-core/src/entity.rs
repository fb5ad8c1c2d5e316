//! Entity trait and the JSON codec that maps entities to stored bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

/// An application record type persisted in its own table.
///
/// `KIND` doubles as the table name and as the tag used for change
/// subscription filtering. The id is assigned by storage on first save.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable kind name, also the table the entity is stored in.
    const KIND: &'static str;

    /// The persisted id, if the entity has been saved before.
    fn id(&self) -> Option<u64>;

    /// Record the id storage assigned to this entity.
    fn set_id(&mut self, id: u64);
}

/// Encode an entity to its stored JSON form.
pub fn encode<T: Entity>(entity: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(entity).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode stored bytes into a JSON document, for filter evaluation.
pub fn decode_value(bytes: &[u8]) -> Result<serde_json::Value, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Decode stored bytes into an entity.
pub fn decode<T: Entity>(bytes: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Convert an already decoded JSON document into an entity.
pub fn from_value<T: Entity>(value: serde_json::Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Option<u64>,
        body: String,
    }

    impl Entity for Note {
        const KIND: &'static str = "Note";

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: u64) {
            self.id = Some(id);
        }
    }

    #[test]
    fn test_encode_decode() {
        let note = Note {
            id: Some(4),
            body: "hello".into(),
        };
        let bytes = encode(&note).unwrap();
        let decoded: Note = decode(&bytes).unwrap();
        assert_eq!(decoded, note);

        let value = decode_value(&bytes).unwrap();
        assert_eq!(value["body"], "hello");
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode::<Note>(b"not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
