//! Browser SSO token polling
//!
//! A background task polls the token-exchange endpoint on a fixed tick and
//! hands each classified outcome to the waiting caller through a one-slot
//! channel. The caller owns the deadline; when it fires, or once a final
//! outcome arrives, the poll task is cancelled and joined so nothing keeps
//! calling the controller afterwards.

use super::AuthError;
use super::pkce::PkcePair;
use crate::controller::{AuthReply, Controller, ControllerError, SsoReply};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the controller ended an SSO attempt
#[derive(Error, Debug)]
pub enum SsoFailure {
    #[error("token request failed: {0}")]
    Transport(#[source] ControllerError),
    #[error(
        "controller rejected the login: {error}{}",
        .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
    )]
    Rejected {
        error: String,
        message: Option<String>,
    },
    #[error("controller answered without a token")]
    EmptyToken,
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
}

/// Result of a single poll
#[derive(Debug)]
pub enum PollOutcome {
    Success(String),
    Pending,
    Failed(SsoFailure),
}

impl PollOutcome {
    /// Classify one token-exchange response
    ///
    /// - 200 with a token: success
    /// - 401 without an error: the browser step is not finished yet
    /// - anything else: final failure
    pub fn classify(result: Result<SsoReply, ControllerError>) -> Self {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return PollOutcome::Failed(SsoFailure::Transport(e)),
        };

        match (reply.status, reply.reply) {
            (StatusCode::OK, AuthReply::Token(token)) => PollOutcome::Success(token),
            (StatusCode::OK, AuthReply::Error { error, message }) => {
                PollOutcome::Failed(SsoFailure::Rejected { error, message })
            }
            (StatusCode::OK, AuthReply::Empty) => PollOutcome::Failed(SsoFailure::EmptyToken),
            (StatusCode::UNAUTHORIZED, AuthReply::Error { error, message }) => {
                PollOutcome::Failed(SsoFailure::Rejected { error, message })
            }
            (StatusCode::UNAUTHORIZED, _) => PollOutcome::Pending,
            (status, _) => PollOutcome::Failed(SsoFailure::UnexpectedStatus(status)),
        }
    }

    fn is_final(&self) -> bool {
        !matches!(self, PollOutcome::Pending)
    }
}

/// Poll every `interval` until a final outcome is sent or `cancel` fires
async fn poll_loop<C: Controller>(
    controller: C,
    base_url: String,
    pkce: PkcePair,
    interval: Duration,
    tx: mpsc::Sender<PollOutcome>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = controller.sso_token(&base_url, &pkce.verifier, &pkce.challenge) => result,
        };

        let outcome = PollOutcome::classify(result);
        debug!("SSO poll outcome: {}", outcome_label(&outcome));
        let done = outcome.is_final();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(outcome) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if done {
            break;
        }
    }

    debug!("SSO poll loop finished");
}

// Never log the token itself
fn outcome_label(outcome: &PollOutcome) -> &'static str {
    match outcome {
        PollOutcome::Success(_) => "success",
        PollOutcome::Pending => "pending",
        PollOutcome::Failed(_) => "failed",
    }
}

/// Poll for the SSO token until it is issued, rejected, or `timeout` elapses
pub async fn wait_for_token<C>(
    controller: &C,
    base_url: &str,
    pkce: &PkcePair,
    interval: Duration,
    timeout: Duration,
) -> Result<String, AuthError>
where
    C: Controller + Clone + 'static,
{
    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poll_loop(
        controller.clone(),
        base_url.to_string(),
        pkce.clone(),
        interval,
        tx,
        cancel.clone(),
    ));

    let deadline = time::sleep(timeout);
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            biased;
            _ = &mut deadline => {
                warn!("No SSO confirmation within {}s", timeout.as_secs());
                break Err(AuthError::AuthTimeout(timeout));
            }
            outcome = rx.recv() => match outcome {
                Some(PollOutcome::Pending) => info!("Waiting for confirmation in the browser..."),
                Some(PollOutcome::Success(token)) => break Ok(token),
                Some(PollOutcome::Failed(reason)) => break Err(AuthError::SsoRejected(reason)),
                // The loop only exits early once cancelled, which happens below
                None => break Err(AuthError::AuthTimeout(timeout)),
            }
        }
    };

    cancel.cancel();
    if let Err(e) = handle.await {
        warn!("SSO poll task ended abnormally: {}", e);
    }

    result
}
