use serde::Serialize;
use tokio::sync::watch;

use crate::poller::PollOutcome;

/// Lifecycle of the tracked dev server.
///
/// `Stopped` is not a resting state: stopping tears the session down and
/// lands back in `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Shell spawned, readiness poll in flight
    Starting,
    Ready,
    /// Poll gave up; the predicted URL was shown anyway
    TimedOutButShown,
}

impl SessionState {
    /// Any state in which a new launch must be refused.
    pub fn is_running(self) -> bool {
        self != SessionState::Idle
    }
}

/// Handed to whoever runs the poll for a session.
#[derive(Debug)]
pub struct SessionTicket {
    pub epoch: u64,
    pub cancel: watch::Receiver<bool>,
}

/// Explicit session record owned by the controller.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    predicted_url: Option<String>,
    process_id: Option<String>,
    epoch: u64,
    cancel: Option<watch::Sender<bool>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn predicted_url(&self) -> Option<&str> {
        self.predicted_url.as_deref()
    }

    pub fn process_id(&self) -> Option<&str> {
        self.process_id.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tracks_process(&self, process_id: &str) -> bool {
        self.process_id.as_deref() == Some(process_id)
    }

    /// `Idle -> Starting`. Refused with the current state otherwise.
    pub fn begin(
        &mut self,
        predicted_url: String,
        process_id: Option<String>,
    ) -> Result<SessionTicket, SessionState> {
        if self.state.is_running() {
            return Err(self.state);
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.epoch += 1;
        self.state = SessionState::Starting;
        self.predicted_url = Some(predicted_url);
        self.process_id = process_id;
        self.cancel = Some(cancel_tx);
        Ok(SessionTicket {
            epoch: self.epoch,
            cancel: cancel_rx,
        })
    }

    /// Apply a poll result. Returns the new state, or `None` when the result
    /// is stale (session stopped or replaced) or the poll was cancelled.
    pub fn finish_poll(&mut self, epoch: u64, outcome: PollOutcome) -> Option<SessionState> {
        if epoch != self.epoch || self.state != SessionState::Starting {
            return None;
        }
        self.state = match outcome {
            PollOutcome::Ready => SessionState::Ready,
            PollOutcome::TimedOut => SessionState::TimedOutButShown,
            PollOutcome::Cancelled => return None,
        };
        // Nothing left to cancel
        self.cancel = None;
        Some(self.state)
    }

    /// Tear down back to `Idle`, cancelling an in-flight poll.
    /// Returns `false` if there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        self.state = SessionState::Idle;
        self.predicted_url = None;
        self.process_id = None;
        true
    }
}
