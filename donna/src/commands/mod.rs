use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::calendar::auth::{ClientSecrets, GoogleAuthenticator, TokenStore};
use crate::calendar::GoogleCalendarService;
use crate::chat::{CompletionClient, OpenAiClient};
use crate::config::Config;
use crate::error_recovery::ErrorRecovery;
use crate::errors::{DonnaError, DonnaResult};
use crate::formatters::TerminalFormatter;

pub mod auth;
pub mod calendar;
pub mod chat;

pub(crate) const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Trait for all command implementations
#[async_trait]
pub trait Command {
    /// Execute the command with the provided context
    async fn execute(&mut self, context: &CommandContext) -> Result<()>;
}

/// Shared context for all commands
pub struct CommandContext {
    pub config: Config,
}

impl CommandContext {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn google_authenticator(&self) -> Result<GoogleAuthenticator> {
        let secrets_path = self.config.client_secrets_path()?;
        let secrets = ClientSecrets::load(&secrets_path).await?;
        let store = TokenStore::new(self.config.token_path()?);
        debug!("Using client secrets {:?}, token file {:?}", secrets_path, store.path());
        Ok(GoogleAuthenticator::new(secrets, store))
    }

    pub async fn calendar_service(&self) -> Result<GoogleCalendarService> {
        let authenticator = self.google_authenticator().await?;
        Ok(GoogleCalendarService::new(
            self.config.google_calendar.api_base_url.clone(),
            Box::new(authenticator),
        ))
    }

    pub fn completion_client(&self) -> Result<Arc<dyn CompletionClient>> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| DonnaError::auth("openai", "No API key configured"))
            .context("Set one with 'donna set-api-key <key>' or the OPENAI_API_KEY environment variable")?;

        Ok(Arc::new(OpenAiClient::new(api_key, self.config.chat.base_url.clone())))
    }

    pub fn formatter(&self) -> Result<TerminalFormatter> {
        Ok(TerminalFormatter::new(self.config.get_timezone()?))
    }

    /// Run a calendar call with the configured retry policy
    pub async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> DonnaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = DonnaResult<T>>,
    {
        ErrorRecovery::retry_with_backoff(
            operation,
            self.config.google_calendar.max_retries,
            RETRY_BASE_DELAY,
            operation_name,
        )
        .await
    }
}

/// Print the re-authentication hint for auth failures and hand the error on
pub(crate) fn explain(error: DonnaError, service: &str) -> anyhow::Error {
    if let Some(hint) = ErrorRecovery::auth_hint(&error, service) {
        eprintln!("💡 {}", hint);
    }
    anyhow::Error::new(error)
}
