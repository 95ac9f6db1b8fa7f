use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::user::User;

pub type ModelId = String;

/// A trained model as kept in the model store.
///
/// `content` is opaque to everything except the engine that produced it and
/// is base64 encoded on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub version: u32,
    #[serde(serialize_with = "encode_content", deserialize_with = "decode_content")]
    pub content: Vec<u8>,
    pub owner: Option<User>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn new(name: impl Into<String>, version: u32, content: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            version,
            content,
            owner: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, owner: Option<User>) -> Self {
        self.owner = owner;
        self
    }
}

fn encode_content<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(content))
}

fn decode_content<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_base64_on_the_wire() {
        let model = Model::new("kmeans", 1, b"{\"k\":2}".to_vec());
        let json = serde_json::to_value(&model).unwrap();

        assert_eq!(json["content"], "eyJrIjoyfQ==");

        let back: Model = serde_json::from_value(json).unwrap();
        assert_eq!(back.content, model.content);
    }

    #[test]
    fn rejects_broken_content() {
        let json = serde_json::json!({
            "id": "m1",
            "name": "kmeans",
            "version": 1,
            "content": "not base64!!",
            "owner": null,
            "created_at": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Model>(json).is_err());
    }
}
