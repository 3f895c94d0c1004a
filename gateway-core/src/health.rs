//! Health check aggregation, transport-agnostic.
//!
//! Provides a [`HealthIndicator`] trait for custom checks and a builder for
//! assembling them into a single aggregated report. Gateways decide how to
//! expose the report on the wire (status code, response body, etc).

use std::time::{Duration, Instant};

use serde::Serialize;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// A named health indicator that can be registered with [`HealthBuilder`].
pub trait HealthIndicator: Send + Sync + 'static {
    /// The name of this health check (e.g. `"broker"`, `"registry"`).
    fn name(&self) -> &str;

    /// Perform the health check.
    fn check(&self) -> impl std::future::Future<Output = HealthStatus> + Send;

    /// Whether this check affects the readiness probe (default: `true`).
    fn affects_readiness(&self) -> bool {
        true
    }
}

/// A single check result in the aggregated report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckStatus {
    Up,
    Down,
}

/// Aggregated health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
    pub uptime_seconds: u64,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == HealthCheckStatus::Up
    }
}

#[doc(hidden)]
pub trait HealthIndicatorErased: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthStatus> + Send + '_>>;
    fn affects_readiness(&self) -> bool;
}

impl<T: HealthIndicator> HealthIndicatorErased for T {
    fn name(&self) -> &str {
        HealthIndicator::name(self)
    }

    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthStatus> + Send + '_>> {
        Box::pin(HealthIndicator::check(self))
    }

    fn affects_readiness(&self) -> bool {
        HealthIndicator::affects_readiness(self)
    }
}

/// Builder for assembling health checks into a [`HealthRegistry`].
pub struct HealthBuilder {
    checks: Vec<Box<dyn HealthIndicatorErased>>,
    cache_ttl: Option<Duration>,
}

impl HealthBuilder {
    pub fn new() -> Self {
        Self { checks: Vec::new(), cache_ttl: None }
    }

    pub fn check<H: HealthIndicator>(mut self, indicator: H) -> Self {
        self.checks.push(Box::new(indicator));
        self
    }

    /// Cache aggregated results for `ttl` before re-running the checks.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn build(self) -> HealthRegistry {
        HealthRegistry {
            checks: self.checks,
            start_time: Instant::now(),
            cache_ttl: self.cache_ttl,
            cache: tokio::sync::RwLock::new(None),
        }
    }
}

impl Default for HealthBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds registered indicators and produces aggregated [`HealthReport`]s.
pub struct HealthRegistry {
    checks: Vec<Box<dyn HealthIndicatorErased>>,
    start_time: Instant,
    cache_ttl: Option<Duration>,
    cache: tokio::sync::RwLock<Option<(HealthReport, Instant)>>,
}

impl HealthRegistry {
    pub fn empty() -> Self {
        HealthBuilder::new().build()
    }

    /// Aggregate every registered check.
    pub async fn aggregate(&self) -> HealthReport {
        self.aggregate_filtered(|_| true).await
    }

    /// Aggregate only checks that affect readiness.
    pub async fn aggregate_readiness(&self) -> HealthReport {
        self.aggregate_filtered(|c| c.affects_readiness()).await
    }

    async fn aggregate_filtered(
        &self,
        include: impl Fn(&dyn HealthIndicatorErased) -> bool,
    ) -> HealthReport {
        if let Some(ttl) = self.cache_ttl {
            let cache = self.cache.read().await;
            if let Some((ref report, ref stamped)) = *cache {
                if stamped.elapsed() < ttl {
                    return report.clone();
                }
            }
        }

        let mut checks = Vec::new();
        let mut all_up = true;
        for indicator in &self.checks {
            if !include(indicator.as_ref()) {
                continue;
            }
            let start = Instant::now();
            let status = indicator.check().await;
            let duration_ms = start.elapsed().as_millis() as u64;
            let (check_status, reason) = match &status {
                HealthStatus::Up => (HealthCheckStatus::Up, None),
                HealthStatus::Down(reason) => {
                    all_up = false;
                    (HealthCheckStatus::Down, Some(reason.clone()))
                }
            };
            checks.push(HealthCheck {
                name: indicator.name().to_string(),
                status: check_status,
                reason,
                duration_ms: Some(duration_ms),
            });
        }

        let report = HealthReport {
            status: if all_up { HealthCheckStatus::Up } else { HealthCheckStatus::Down },
            checks,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        };

        if self.cache_ttl.is_some() {
            let mut cache = self.cache.write().await;
            *cache = Some((report.clone(), Instant::now()));
        }

        report
    }
}
