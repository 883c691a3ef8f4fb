use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::errors::{DonnaError, DonnaResult};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Error recovery strategies for calendar provider calls
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Retry an operation with exponential backoff.
    ///
    /// Only retryable errors (rate limiting, transient network failures) are
    /// retried; a rate-limit `Retry-After` replaces the computed delay.
    pub async fn retry_with_backoff<F, Fut, T>(
        operation: F,
        max_attempts: usize,
        base_delay: Duration,
        operation_name: &str,
    ) -> DonnaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = DonnaResult<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempts = 0;
        let mut delay = base_delay;

        loop {
            attempts += 1;

            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation_name, attempts);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        debug!("{} failed with non-retryable error: {}", operation_name, error);
                        return Err(error);
                    }

                    if attempts >= max_attempts {
                        error!("{} failed after {} attempts: {}", operation_name, attempts, error);
                        return Err(error);
                    }

                    let wait = error.retry_after().unwrap_or(delay).min(MAX_BACKOFF);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        operation_name, attempts, max_attempts, error, wait
                    );

                    sleep(wait).await;
                    delay = std::cmp::min(delay * 2, MAX_BACKOFF);
                }
            }
        }
    }

    /// Handle authentication errors with user-friendly messages
    pub fn auth_hint(error: &DonnaError, service: &str) -> Option<&'static str> {
        if !error.is_auth() {
            return None;
        }

        let message = match service {
            "google" => "Google Calendar authentication failed. Please run 'donna auth' to re-authenticate.",
            "openai" => "Chat API authentication failed. Please check your API key with 'donna set-api-key <key>'.",
            _ => "Authentication failed. Please check your credentials.",
        };
        Some(message)
    }
}
