//! Service/endpoint/route data model and the registry that enforces
//! qualified-name uniqueness and per-gateway route non-collision.
//!
//! Neither the API gateway's path tree nor the event gateway's topic
//! subscriptions live here — each gateway builds its own dispatch structure
//! by reading [`Registry::routes_for_gateway`] once at `Listen` time. This
//! crate only owns the bookkeeping both gateways need to agree on.

mod model;
mod registry;

pub use model::{Endpoint, EndpointRoute, InputFactory, Service};
pub use registry::{Registry, RegistryError};
