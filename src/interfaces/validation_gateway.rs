// ============================================================================
// Validation Gateway Interface
// The only I/O boundary of the engine: confirms or refuses candidate rates
// ============================================================================

use crate::domain::CurrencyCode;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a validation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Transport-level failure of a gateway. Resolved by the reconciler as a
/// rollback, never propagated to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("validation service unavailable: {0}")]
    Unavailable(String),

    /// The gateway panicked while validating
    #[error("validation gateway panicked")]
    Panicked,
}

/// External authority deciding whether a candidate rate may be committed.
///
/// Latency and outcome are opaque to the engine. A call may never resolve,
/// and its future may be dropped at any await point when a newer edit
/// supersedes it.
#[async_trait]
pub trait ValidationGateway: Send + Sync {
    /// Validate `candidate` as the new rate of `key`
    async fn validate(
        &self,
        key: &CurrencyCode,
        candidate: Decimal,
    ) -> Result<Verdict, GatewayError>;

    /// Gateway name for logging
    fn name(&self) -> &str {
        "gateway"
    }
}

#[async_trait]
impl<G: ValidationGateway + ?Sized> ValidationGateway for Arc<G> {
    async fn validate(
        &self,
        key: &CurrencyCode,
        candidate: Decimal,
    ) -> Result<Verdict, GatewayError> {
        (**self).validate(key, candidate).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Reference Gateways
// ============================================================================

/// Accepts every candidate immediately
pub struct AcceptAllGateway;

#[async_trait]
impl ValidationGateway for AcceptAllGateway {
    async fn validate(
        &self,
        _key: &CurrencyCode,
        _candidate: Decimal,
    ) -> Result<Verdict, GatewayError> {
        Ok(Verdict::Accepted)
    }

    fn name(&self) -> &str {
        "accept-all"
    }
}

/// Accepts candidates inside an inclusive band, rejects everything else
pub struct BoundsGateway {
    min: Decimal,
    max: Decimal,
}

impl BoundsGateway {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    /// Strictly positive rates only
    pub fn positive() -> Self {
        Self::new(Decimal::new(1, 28), crate::numeric::MAX_AMOUNT)
    }
}

#[async_trait]
impl ValidationGateway for BoundsGateway {
    async fn validate(
        &self,
        _key: &CurrencyCode,
        candidate: Decimal,
    ) -> Result<Verdict, GatewayError> {
        if candidate >= self.min && candidate <= self.max {
            Ok(Verdict::Accepted)
        } else {
            Ok(Verdict::Rejected)
        }
    }

    fn name(&self) -> &str {
        "bounds"
    }
}

/// Wraps another gateway and answers after a fixed latency
pub struct DelayedGateway<G> {
    inner: G,
    latency: Duration,
}

impl<G: ValidationGateway> DelayedGateway<G> {
    pub fn new(inner: G, latency: Duration) -> Self {
        Self { inner, latency }
    }
}

#[async_trait]
impl<G: ValidationGateway> ValidationGateway for DelayedGateway<G> {
    async fn validate(
        &self,
        key: &CurrencyCode,
        candidate: Decimal,
    ) -> Result<Verdict, GatewayError> {
        tokio::time::sleep(self.latency).await;
        self.inner.validate(key, candidate).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_all() {
        let verdict = AcceptAllGateway
            .validate(&CurrencyCode::new("eur"), Decimal::new(-1, 0))
            .await;
        assert_eq!(verdict, Ok(Verdict::Accepted));
    }

    #[tokio::test]
    async fn test_bounds_gateway() {
        let gateway = BoundsGateway::new(Decimal::ONE, Decimal::TEN);
        let key = CurrencyCode::new("eur");

        assert_eq!(
            gateway.validate(&key, Decimal::ONE).await,
            Ok(Verdict::Accepted)
        );
        assert_eq!(
            gateway.validate(&key, Decimal::TEN).await,
            Ok(Verdict::Accepted)
        );
        assert_eq!(
            gateway.validate(&key, Decimal::ZERO).await,
            Ok(Verdict::Rejected)
        );
        assert_eq!(
            BoundsGateway::positive().validate(&key, Decimal::ZERO).await,
            Ok(Verdict::Rejected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_gateway_waits() {
        let gateway = DelayedGateway::new(AcceptAllGateway, Duration::from_millis(200));
        let started = tokio::time::Instant::now();

        let verdict = gateway.validate(&CurrencyCode::new("usd"), Decimal::ONE).await;

        assert_eq!(verdict, Ok(Verdict::Accepted));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(gateway.name(), "accept-all");
    }
}
