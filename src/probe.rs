//! Network round-trip calibration.
//!
//! Before any transport has a latency history, strategy timeouts are derived from a ping: an
//! HTTP `GET` to a tiny reference endpoint that answers `204 No Content`. A [`PingSource`] picks
//! whether that ping is measured, fixed, or absent.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy::transports::http::reqwest::{self, Client, Url};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, timeout},
};
use tokio_util::sync::CancellationToken;

/// Endpoint answering `204 No Content` with no body.
pub const DEFAULT_PING_URL: &str = "https://www.google.com/generate_204";
/// Default period between background measurements.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default budget for a single measurement.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Ping request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid ping URL: {0}")]
    InvalidUrl(String),
    #[error("Ping timed out")]
    Timeout,
}

/// Measures HTTP round-trip time to a reference endpoint.
#[derive(Clone, Debug)]
pub struct LatencyProbe {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl LatencyProbe {
    /// Creates a probe against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Http`] if the HTTP client cannot be initialized.
    pub fn new(url: Url) -> Result<Self, ProbeError> {
        let client = Client::builder().build()?;
        Ok(Self { client, url, timeout: DEFAULT_PING_TIMEOUT })
    }

    /// Creates a probe against [`DEFAULT_PING_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Http`] if the HTTP client cannot be initialized.
    pub fn with_default_url() -> Result<Self, ProbeError> {
        let url =
            DEFAULT_PING_URL.parse().map_err(|_| ProbeError::InvalidUrl(DEFAULT_PING_URL.into()))?;
        Self::new(url)
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Performs one measurement.
    ///
    /// A fresh `cacheBuster` query parameter is appended so intermediaries cannot answer from a
    /// cache.
    ///
    /// # Errors
    ///
    /// * [`ProbeError::Timeout`] if no response arrives within the probe's timeout.
    /// * [`ProbeError::Http`] if the request fails or the endpoint answers with an error status.
    pub async fn measure(&self) -> Result<Duration, ProbeError> {
        let url = self.busted_url();
        let started_at = Instant::now();
        let response = timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| ProbeError::Timeout)??;
        let elapsed = started_at.elapsed();
        response.error_for_status()?;
        Ok(elapsed)
    }

    /// Measures every `interval` until `cancel` fires, publishing the latest round-trip time.
    ///
    /// The receiver starts at `None`. A failed measurement keeps the previous value.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero. [`ContractEventsBuilder::connect`](crate::ContractEventsBuilder::connect)
    /// rejects such a source before it gets here.
    #[must_use]
    pub fn spawn(
        self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> watch::Receiver<Option<Duration>> {
        let (sender, receiver) = watch::channel(None);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.measure().await {
                    Ok(ping) => {
                        trace!(ping_ms = ping.as_millis(), "Measured ping");
                        sender.send_replace(Some(ping));
                    }
                    Err(e) => warn!(url = %self.url, error = %e, "Ping failed, keeping previous value"),
                }

                if sender.is_closed() {
                    break;
                }
            }

            debug!("Latency probe stopped");
        });

        receiver
    }

    fn busted_url(&self) -> Url {
        static NONCE: AtomicU64 = AtomicU64::new(0);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let nonce = seed.wrapping_add(NONCE.fetch_add(1, Ordering::Relaxed));

        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("cacheBuster", &nonce.to_string());
        url
    }
}

/// How default timeouts are calibrated.
#[derive(Clone, Debug, Default)]
pub enum PingSource {
    /// Measure periodically with a [`LatencyProbe`].
    Probe { probe: LatencyProbe, interval: Duration },
    /// Use a fixed round-trip time.
    Fixed(Duration),
    /// No ping; timeouts fall back to the strategy's fallback timeout.
    #[default]
    Disabled,
}

impl PingSource {
    /// Measures with `probe` every [`DEFAULT_PING_INTERVAL`].
    #[must_use]
    pub fn probe(probe: LatencyProbe) -> Self {
        PingSource::Probe { probe, interval: DEFAULT_PING_INTERVAL }
    }

    /// Starts the source. Fixed and disabled sources publish once and never change.
    pub(crate) fn start(self, cancel: CancellationToken) -> watch::Receiver<Option<Duration>> {
        match self {
            PingSource::Probe { probe, interval } => probe.spawn(interval, cancel),
            PingSource::Fixed(ping) => watch::channel(Some(ping)).1,
            PingSource::Disabled => watch::channel(None).1,
        }
    }
}
