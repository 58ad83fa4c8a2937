//! Delivery transports.

use std::thread;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use hookrelay_core::{Delivery, Payload, RelayError, RelayResult};

/// Default outbound request timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each payload to a fixed endpoint.
///
/// Any 2xx response is a success. Non-2xx statuses and transport errors
/// (including the timeout) are delivery failures.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
    url: String,
}

impl HttpDelivery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::delivery(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Delivery for HttpDelivery {
    fn attempt(&self, payload: &Payload) -> RelayResult<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.as_bytes().to_vec())
            .send()
            .map_err(|e| RelayError::delivery(format!("POST {}: {e}", self.url)))?;

        let status = response.status();
        debug!(url = %self.url, %status, "delivery response");

        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::delivery(format!(
                "POST {} returned {status}",
                self.url
            )))
        }
    }
}

/// Stand-in transport for local runs: sleeps, then fails with a fixed
/// probability.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedDelivery {
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedDelivery {
    pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self {
            latency,
            failure_rate,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedDelivery {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LATENCY, 0.5)
    }
}

impl Delivery for SimulatedDelivery {
    fn attempt(&self, payload: &Payload) -> RelayResult<()> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if rand::thread_rng().gen_bool(self.failure_rate) {
            Err(RelayError::delivery(format!(
                "simulated failure delivering {}",
                payload.preview(32)
            )))
        } else {
            Ok(())
        }
    }
}
