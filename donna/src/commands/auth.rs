use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::{Command, CommandContext};
use crate::config::Config;
use crate::errors::DonnaError;

/// Command to authorize Google Calendar access, or report the stored token
pub struct AuthGoogleCommand {
    pub status_only: bool,
}

/// Command to store the chat API key
pub struct SetApiKeyCommand {
    pub api_key: String,
}

#[async_trait]
impl Command for AuthGoogleCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let authenticator = context.google_authenticator().await?;
        let token_path = authenticator.token_store().path().display().to_string();

        if self.status_only {
            match authenticator.status().await? {
                Some(token) if token.is_valid_at(Utc::now()) => {
                    println!("✅ Authenticated with Google Calendar");
                    if let Some(expires_at) = token.expires_at {
                        println!("   Access token valid until {}", expires_at);
                    }
                }
                Some(token) if token.refresh_token.is_some() => {
                    println!("⚠️  Access token expired, it will be refreshed on the next calendar command");
                }
                Some(_) => {
                    println!("❌ Access token expired and no refresh token stored");
                    println!("💡 Run 'donna auth' to authorize again");
                }
                None => {
                    println!("❌ Not authenticated with Google Calendar");
                    println!("💡 Run 'donna auth' to authorize");
                }
            }
            println!("   Token file: {}", token_path);
            return Ok(());
        }

        info!("Setting up Google Calendar authentication...");
        authenticator.login().await?;

        println!("✅ Google Calendar authentication successful!");
        println!("   Token saved to {}", token_path);
        Ok(())
    }
}

#[async_trait]
impl Command for SetApiKeyCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        println!("🔑 Setting chat API key in configuration...");

        let mut config = context.config.clone();
        apply_api_key(&mut config, &self.api_key)?;
        config.save().await?;

        println!("✅ API key saved to {}", Config::get_config_path()?.display());
        Ok(())
    }
}

/// Validate the key format and store it in `config`
pub fn apply_api_key(config: &mut Config, api_key: &str) -> Result<(), DonnaError> {
    let api_key = api_key.trim();
    if !api_key.starts_with("sk-") {
        return Err(DonnaError::validation("api_key", "API keys should start with 'sk-'"));
    }

    info!("Storing API key ({} chars)", api_key.len());
    config.chat.api_key = Some(api_key.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_format() {
        let mut config = Config::default();

        assert!(matches!(
            apply_api_key(&mut config, "not-a-key"),
            Err(DonnaError::Validation { .. })
        ));
        assert_eq!(config.chat.api_key, None);

        apply_api_key(&mut config, "  sk-test123\n").unwrap();
        assert_eq!(config.chat.api_key.as_deref(), Some("sk-test123"));
    }
}
