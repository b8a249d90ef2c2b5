//! Readiness polling for a predicted dev-server URL.
//!
//! Probe cycles are strictly sequential: one GET, then (if it failed) a fixed
//! delay, then the next GET. Any HTTP response counts as "up", whatever its
//! status. Every suspension point also watches a cancellation signal so a
//! stopped session does not keep polling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Default number of probe cycles used by the controller.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Fixed delay between failed probe cycles.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for one probe so a hung connection cannot stall the loop.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

impl PollOutcome {
    pub fn is_ready(self) -> bool {
        self == PollOutcome::Ready
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// One probe cycle: `true` if the endpoint produced any response.
pub trait Probe: Send + Sync {
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// Unauthenticated HTTP GET probe. Redirects are not followed: a 3xx is
/// already proof that something is listening.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url, status = response.status().as_u16(), "Probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(url, "Probe failed: {e}");
                false
            }
        }
    }
}

/// A cancellation receiver that never fires.
pub fn never_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Resolves once `cancel` reads `true`. A dropped sender without a prior
/// cancel means nobody can cancel anymore, so this never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Probe `url` until it answers, the attempt budget runs out, or `cancel` fires.
pub async fn poll_until_ready<P: Probe>(
    probe: &P,
    url: &str,
    policy: &PollPolicy,
    mut cancel: watch::Receiver<bool>,
) -> PollOutcome {
    for attempt in 1..=policy.max_attempts {
        if *cancel.borrow() {
            return PollOutcome::Cancelled;
        }

        let ready = tokio::select! {
            ready = probe.probe(url) => ready,
            _ = cancelled(&mut cancel) => return PollOutcome::Cancelled,
        };
        if ready {
            tracing::info!(url, attempt, "Server is answering");
            return PollOutcome::Ready;
        }
        tracing::debug!(url, attempt, max_attempts = policy.max_attempts, "Server not ready yet");

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.retry_delay) => {}
                _ = cancelled(&mut cancel) => return PollOutcome::Cancelled,
            }
        }
    }

    tracing::warn!(url, max_attempts = policy.max_attempts, "Server did not answer in time");
    PollOutcome::TimedOut
}

/// `true` once `url` answers within `max_attempts` one-second-spaced probes.
pub async fn check_server_availability(url: &str, max_attempts: u32) -> bool {
    let probe = match HttpProbe::new(DEFAULT_PROBE_TIMEOUT) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("{e}");
            return false;
        }
    };
    let policy = PollPolicy {
        max_attempts,
        ..PollPolicy::default()
    };
    poll_until_ready(&probe, url, &policy, never_cancelled())
        .await
        .is_ready()
}
