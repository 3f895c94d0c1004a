//! The `Gateway` trait: the common lifecycle surface the server facade
//! drives uniformly over the API gateway and the event gateway.

use std::time::Duration;

use futures_core::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::envelope::GatewayKind;
use crate::error::GatewayError;

/// Parameters for a graceful shutdown: how long to wait for in-flight work
/// to drain, and a token that fires early if a second interrupt arrives.
#[derive(Clone)]
pub struct ShutdownContext {
    pub deadline: Duration,
    pub interrupt: CancellationToken,
}

impl ShutdownContext {
    pub fn new(deadline: Duration, interrupt: CancellationToken) -> Self {
        Self { deadline, interrupt }
    }
}

/// Implemented by every gateway (API, events). The server facade owns a
/// `Vec<Arc<dyn Gateway>>`, starts each on its own task at `Run`, and fans
/// `Shutdown` out to all of them.
pub trait Gateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Start accepting work and block until the gateway stops on its own
    /// (an error) or is told to shut down. Returning `Ok(())` after a
    /// `shutdown` call is a clean stop; returning early on its own is
    /// reported to `Server::run`'s select as the reason every gateway
    /// winds down.
    fn listen(&self) -> BoxFuture<'_, Result<(), GatewayError>>;

    /// Stop accepting new work and drain in-flight calls, bounded by
    /// `ctx.deadline` or an early `ctx.interrupt`, whichever comes first.
    fn shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, ()>;
}
