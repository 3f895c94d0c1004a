//! The metadata envelope threaded through every hop: API request, event
//! message, and in-process `Invoke`.
//!
//! An [`Envelope`] is immutable once built — [`Envelope::derive`] and the
//! other `with_*` builders always return a new, independent envelope.
//! Internally the value bag is reference-counted so deriving a child is a
//! cheap clone-and-overlay, not a deep copy per hop.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which gateway produced or is handling the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayKind {
    Api,
    Events,
}

/// {service name, endpoint name, gateway type, method, path, resolved roles}
/// for the endpoint currently handling this envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub service: String,
    pub endpoint: String,
    pub gateway: GatewayKind,
    pub method: String,
    pub path: String,
    pub roles: Vec<String>,
}

impl RouteDescriptor {
    /// The `service.endpoint` qualified name — the broker consumer-group key
    /// and publish topic for this route.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.endpoint)
    }
}

/// A request-header multimap: one key may carry several values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderMap(HashMap<String, Vec<String>>);

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.entry(name.to_ascii_lowercase()).or_default().push(value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn merge_from(&mut self, other: &HeaderMap) {
        for (name, values) in other.iter() {
            for value in values {
                self.insert(name, value.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Inner {
    values: HashMap<String, serde_json::Value>,
    authorization: Option<String>,
    trace_id: String,
    route: Option<RouteDescriptor>,
    headers: HeaderMap,
}

/// Typed, serializable context carried across every hop of an invocation.
///
/// Envelopes are immutable per scope: every mutator consumes `&self` and
/// returns a brand new [`Envelope`]; nothing ever edits a shared instance in
/// place.
#[derive(Debug, Clone)]
pub struct Envelope(Arc<Inner>);

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// A fresh root envelope with a newly minted, non-empty trace id.
    pub fn new() -> Self {
        Envelope(Arc::new(Inner {
            trace_id: Uuid::new_v4().to_string(),
            ..Inner::default()
        }))
    }

    /// A root envelope with no trace id yet. For callers that must resolve
    /// a trace id from an external source (decoded metadata, a request
    /// header) before falling back to a freshly minted one via
    /// [`Envelope::with_trace_id_if_absent`] — `new()` would make that
    /// fallback unreachable since it always mints one up front.
    pub fn blank() -> Self {
        Envelope(Arc::new(Inner::default()))
    }

    fn child(&self, mutate: impl FnOnce(&mut Inner)) -> Envelope {
        let mut inner = (*self.0).clone();
        mutate(&mut inner);
        Envelope(Arc::new(inner))
    }

    /// Produce a descendant carrying one additional free-form value.
    pub fn derive(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Envelope {
        let key = key.into();
        let value = value.into();
        self.child(|inner| {
            inner.values.insert(key, value);
        })
    }

    pub fn with_authorization(&self, authorization: impl Into<String>) -> Envelope {
        let authorization = authorization.into();
        self.child(|inner| inner.authorization = Some(authorization))
    }

    /// Set the trace id, but only if none is set yet — once a trace id is
    /// assigned it is preserved across any number of derive/encode/decode
    /// hops.
    pub fn with_trace_id_if_absent(&self, trace_id: impl Into<String>) -> Envelope {
        if !self.trace_id().is_empty() {
            return self.clone();
        }
        let trace_id = trace_id.into();
        self.child(|inner| inner.trace_id = trace_id)
    }

    pub fn with_route(&self, route: RouteDescriptor) -> Envelope {
        self.child(|inner| inner.route = Some(route))
    }

    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Envelope {
        let name = name.to_string();
        let value = value.into();
        self.child(|inner| inner.headers.insert(&name, value))
    }

    pub fn authorization(&self) -> Option<&str> {
        self.0.authorization.as_deref()
    }

    pub fn trace_id(&self) -> &str {
        &self.0.trace_id
    }

    pub fn route(&self) -> Option<&RouteDescriptor> {
        self.0.route.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.0.headers
    }

    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.values.get(key)
    }

    /// The full free-form value bag, used when flattening a response into an
    /// event envelope's value map.
    pub fn values(&self) -> &HashMap<String, serde_json::Value> {
        &self.0.values
    }

    /// Serialize the well-known slots plus the value bag into the stable
    /// wire form. This is the only representation that crosses a process
    /// boundary (the `X-RPC-Metadata` header for the API gateway, the event
    /// envelope's metadata field for the event gateway).
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let wire = Wire {
            authorization: self.0.authorization.clone(),
            trace_id: self.0.trace_id.clone(),
            route: self.0.route.clone(),
            headers: self.0.headers.clone(),
            values: self.0.values.clone(),
        };
        serde_json::to_vec(&wire).map_err(EnvelopeError::Encode)
    }

    /// Decode `bytes` and merge the result into `parent`. Well-known slots
    /// and values present on the wire win; anything set only on `parent`
    /// (and absent from the wire) is preserved, never clobbered.
    pub fn decode(parent: &Envelope, bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        let wire: Wire = serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)?;
        Ok(parent.child(|inner| {
            if wire.authorization.is_some() {
                inner.authorization = wire.authorization;
            }
            if !wire.trace_id.is_empty() {
                inner.trace_id = wire.trace_id;
            }
            if wire.route.is_some() {
                inner.route = wire.route;
            }
            inner.headers.merge_from(&wire.headers);
            for (key, value) in wire.values {
                inner.values.insert(key, value);
            }
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Wire {
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization: Option<String>,
    trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<RouteDescriptor>,
    #[serde(default)]
    headers: HeaderMap,
    #[serde(default)]
    values: HashMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub enum EnvelopeError {
    Encode(serde_json::Error),
    Decode(serde_json::Error),
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeError::Encode(e) => write!(f, "failed to encode envelope: {e}"),
            EnvelopeError::Decode(e) => write!(f, "failed to decode envelope: {e}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(endpoint: &str) -> RouteDescriptor {
        RouteDescriptor {
            service: "Svc".into(),
            endpoint: endpoint.into(),
            gateway: GatewayKind::Api,
            method: "POST".into(),
            path: "/Svc.Op".into(),
            roles: vec![],
        }
    }

    #[test]
    fn decode_encode_round_trip_preserves_well_known_slots_and_values() {
        let envelope = Envelope::new()
            .with_authorization("Bearer x")
            .with_route(route("Op"))
            .derive("greeting", "hi");

        let bytes = envelope.encode().unwrap();
        let restored = Envelope::decode(&Envelope::new(), &bytes).unwrap();

        assert_eq!(restored.authorization(), Some("Bearer x"));
        assert_eq!(restored.trace_id(), envelope.trace_id());
        assert_eq!(restored.route().unwrap().endpoint, "Op");
        assert_eq!(restored.value("greeting").unwrap(), "hi");
    }

    #[test]
    fn trace_id_survives_arbitrary_encode_decode_chains() {
        let original = Envelope::new();
        let trace_id = original.trace_id().to_string();

        let mut current = original;
        for _ in 0..5 {
            let bytes = current.encode().unwrap();
            current = Envelope::decode(&Envelope::new(), &bytes).unwrap();
        }

        assert_eq!(current.trace_id(), trace_id);
    }

    #[test]
    fn decode_does_not_clobber_locally_derived_values_absent_from_wire() {
        let parent = Envelope::new().derive("local_only", "kept");
        let child_on_wire = Envelope::new().derive("from_wire", "value");
        let bytes = child_on_wire.encode().unwrap();

        let merged = Envelope::decode(&parent, &bytes).unwrap();

        assert_eq!(merged.value("local_only").unwrap(), "kept");
        assert_eq!(merged.value("from_wire").unwrap(), "value");
    }

    #[test]
    fn with_trace_id_if_absent_never_overwrites_an_existing_trace_id() {
        let envelope = Envelope::new();
        let original = envelope.trace_id().to_string();
        let unchanged = envelope.with_trace_id_if_absent("should-not-apply");
        assert_eq!(unchanged.trace_id(), original);
    }

    #[test]
    fn qualified_name_joins_service_and_endpoint() {
        assert_eq!(route("Op").qualified_name(), "Svc.Op");
    }
}
