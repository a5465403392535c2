//! Synthetic link source for demos without a device.
//!
//! Produces random-walk RSRP / RSRQ / SINR readings formatted the way the
//! dashboard displays them, and can expire its session every N metric reads to
//! exercise the reauthentication path end to end.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::fields::{metadata, RSRP, RSRQ, SINR};
use super::{MetricSpec, SampleSource, SourceError, RADIO_METRICS};
use crate::config::Credentials;

/// Simulated per-read latency.
const READ_LATENCY_MS: u64 = 20;

/// Simulated session.
#[derive(Debug)]
pub struct SimSession {
    id: u64,
    reads: u64,
    view: String,
}

struct Walk {
    spec: MetricSpec,
    value: i64,
    bounds: (i64, i64),
}

/// Random-walk sample source.
pub struct SimulatedSource {
    rng: StdRng,
    walks: Vec<Walk>,
    expire_after_reads: Option<u64>,
    sessions: u64,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic source for tests and reproducible demos.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            walks: vec![
                Walk { spec: RSRP, value: -90, bounds: (-125, -65) },
                Walk { spec: RSRQ, value: -11, bounds: (-20, -3) },
                Walk { spec: SINR, value: 12, bounds: (-5, 30) },
            ],
            expire_after_reads: None,
            sessions: 0,
        }
    }

    /// Expire each session after `reads` successful metric reads.
    ///
    /// Raised to one full acquisition cycle, so every fresh session can
    /// deliver at least one sample before it expires again. Metadata reads
    /// are not counted.
    pub fn expiring_every(mut self, reads: u64) -> Self {
        let cycle = RADIO_METRICS.len() as u64;
        self.expire_after_reads = Some(reads.max(cycle));
        self
    }

    fn step(&mut self, field: &str) -> Option<String> {
        let walk = self.walks.iter_mut().find(|w| w.spec.field == field)?;
        let delta: i64 = self.rng.gen_range(-2..=2);
        walk.value = (walk.value + delta).clamp(walk.bounds.0, walk.bounds.1);
        Some(format!("{} {}", walk.value, walk.spec.unit))
    }

    fn metadata(field: &str) -> Option<&'static str> {
        match field {
            metadata::MODEL => Some("SIM-ODU 5G"),
            metadata::MAC => Some("02:00:5E:10:00:01"),
            metadata::IMSI => Some("001010123456789"),
            metadata::BAND => Some("78"),
            _ => None,
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    type Handle = SimSession;

    async fn connect(
        &mut self,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<SimSession, SourceError> {
        self.sessions += 1;
        tracing::info!(session = self.sessions, "Simulated session opened");
        Ok(SimSession {
            id: self.sessions,
            reads: 0,
            view: "/".to_string(),
        })
    }

    async fn navigate(
        &mut self,
        handle: &mut SimSession,
        target: &str,
        _timeout: Duration,
    ) -> Result<(), SourceError> {
        handle.view = target.to_string();
        Ok(())
    }

    async fn read_field(
        &mut self,
        handle: &mut SimSession,
        field: &str,
        timeout: Duration,
    ) -> Result<String, SourceError> {
        let timed_out = || SourceError::FieldTimeout {
            field: field.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        tokio::time::sleep(Duration::from_millis(READ_LATENCY_MS).min(timeout)).await;
        if let Some(text) = Self::metadata(field) {
            return Ok(text.to_string());
        }

        if self.expire_after_reads.is_some_and(|limit| handle.reads >= limit) {
            tokio::time::sleep(timeout).await;
            return Err(timed_out());
        }

        match self.step(field) {
            Some(text) => {
                handle.reads += 1;
                Ok(text)
            }
            None => {
                tokio::time::sleep(timeout).await;
                Err(timed_out())
            }
        }
    }

    async fn configure(
        &mut self,
        _handle: &mut SimSession,
        option: &str,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), SourceError> {
        tracing::debug!(option, value, "Simulated configure");
        Ok(())
    }

    async fn close(&mut self, handle: SimSession) {
        tracing::info!(session = handle.id, reads = handle.reads, view = %handle.view, "Simulated session closed");
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::fields::parse_metric;

    #[tokio::test(start_paused = true)]
    async fn test_readings_parse_and_stay_in_bounds() {
        let mut source = SimulatedSource::with_seed(7);
        let mut session = source
            .connect(&Credentials::default(), Duration::from_secs(5))
            .await
            .unwrap();

        for _ in 0..100 {
            let text = source
                .read_field(&mut session, RSRP.field, Duration::from_secs(1))
                .await
                .unwrap();
            let value = parse_metric(&RSRP, &text).unwrap().as_f64();
            assert!((-125.0..=-65.0).contains(&value), "{value}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_after_configured_reads() {
        let mut source = SimulatedSource::with_seed(1).expiring_every(4);
        let timeout = Duration::from_secs(1);
        let mut session = source.connect(&Credentials::default(), timeout).await.unwrap();

        for _ in 0..4 {
            assert!(source.read_field(&mut session, SINR.field, timeout).await.is_ok());
        }
        assert!(source.read_field(&mut session, metadata::BAND, timeout).await.is_ok());
        let err = source.read_field(&mut session, SINR.field, timeout).await.unwrap_err();
        assert!(err.is_field_timeout());

        source.close(session).await;
        let mut fresh = source.connect(&Credentials::default(), timeout).await.unwrap();
        assert!(source.read_field(&mut fresh, SINR.field, timeout).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_never_shorter_than_one_cycle() {
        let mut source = SimulatedSource::with_seed(2).expiring_every(1);
        let timeout = Duration::from_secs(1);
        let mut session = source.connect(&Credentials::default(), timeout).await.unwrap();

        for _ in 0..2 {
            for spec in RADIO_METRICS {
                assert!(source.read_field(&mut session, metadata::MODEL, timeout).await.is_ok());
                assert!(source.read_field(&mut session, spec.field, timeout).await.is_ok());
            }
            source.close(session).await;
            session = source.connect(&Credentials::default(), timeout).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_fields() {
        let mut source = SimulatedSource::with_seed(3);
        let timeout = Duration::from_secs(1);
        let mut session = source.connect(&Credentials::default(), timeout).await.unwrap();
        let band = source.read_field(&mut session, metadata::BAND, timeout).await.unwrap();
        assert_eq!(band, "78");
    }
}
