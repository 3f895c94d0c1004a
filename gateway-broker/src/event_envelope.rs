//! The event message envelope: the wire shape carried as a broker payload.
//!
//! Encoder-agnostic per the external interface contract — this crate picks
//! `serde_json` as the concrete encoding, the same choice
//! `gateway_core::envelope::Envelope::encode` makes for its own wire form.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// {service name, endpoint name, opaque encoded metadata, flattened value
/// map of the response}. The value map uses dotted paths for nested fields
/// (`ContactInfo.Email`), produced by `gateway_core::fields::flatten`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub service_name: String,
    pub name: String,
    pub metadata: Vec<u8>,
    pub values: HashMap<String, Vec<String>>,
}

#[derive(Debug)]
pub struct EventEnvelopeError(serde_json::Error);

impl std::fmt::Display for EventEnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to (de)serialize event envelope: {}", self.0)
    }
}

impl std::error::Error for EventEnvelopeError {}

impl EventEnvelope {
    pub fn encode(&self) -> Result<Bytes, EventEnvelopeError> {
        serde_json::to_vec(self).map(Bytes::from).map_err(EventEnvelopeError)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EventEnvelopeError> {
        serde_json::from_slice(bytes).map_err(EventEnvelopeError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_every_field() {
        let mut values = HashMap::new();
        values.insert("ContactInfo.Email".to_string(), vec!["a@b.com".to_string()]);

        let envelope = EventEnvelope {
            service_name: "Svc".into(),
            name: "Op".into(),
            metadata: vec![1, 2, 3],
            values,
        };

        let bytes = envelope.encode().unwrap();
        let restored = EventEnvelope::decode(&bytes).unwrap();

        assert_eq!(restored.service_name, "Svc");
        assert_eq!(restored.name, "Op");
        assert_eq!(restored.metadata, vec![1, 2, 3]);
        assert_eq!(restored.values.get("ContactInfo.Email").unwrap(), &vec!["a@b.com".to_string()]);
    }
}
