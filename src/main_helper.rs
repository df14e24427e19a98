use crate::constants::{
    AI_GATEWAY_CHAT_COMPLETIONS, DEFAULT_MODEL, ENV_AI_GATEWAY_API_KEY, ENV_CDP_API_KEY_NAME,
    ENV_CDP_API_KEY_SECRET,
};
use crate::db::DbPool;
use crate::types::*;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value = "base-agent.db")]
    pub database: String,
    #[arg(long, default_value = AI_GATEWAY_CHAT_COMPLETIONS)]
    pub gateway_url: String,
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    pub max_body_size: usize,
    #[arg(long, default_value = "logs")]
    pub log_dir: String,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            database: "base-agent.db".to_string(),
            gateway_url: AI_GATEWAY_CHAT_COMPLETIONS.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_body_size: 2 * 1024 * 1024,
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct CdpCredentials {
    pub key_name: String,
    pub key_secret: String,
}

impl std::fmt::Debug for CdpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpCredentials")
            .field("key_name", &self.key_name)
            .field("key_secret", &"[REDACTED]")
            .finish()
    }
}

/// Secrets read from the environment. Absence is tolerated at startup and
/// reported per request as a configuration error.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gateway_api_key: Option<String>,
    pub cdp: Option<CdpCredentials>,
}

fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        let cdp = match (
            non_empty_env(ENV_CDP_API_KEY_NAME),
            non_empty_env(ENV_CDP_API_KEY_SECRET),
        ) {
            (Some(key_name), Some(key_secret)) => Some(CdpCredentials {
                key_name,
                key_secret,
            }),
            _ => None,
        };
        Self {
            gateway_api_key: non_empty_env(ENV_AI_GATEWAY_API_KEY),
            cdp,
        }
    }

    pub fn gateway_key(&self) -> Result<&str> {
        match self.gateway_api_key.as_deref() {
            Some(k) => Ok(k),
            None => Err(AgentError::Configuration(format!(
                "{} is not configured",
                ENV_AI_GATEWAY_API_KEY
            ))
            .into()),
        }
    }

    pub fn cdp(&self) -> Result<&CdpCredentials> {
        match self.cdp.as_ref() {
            Some(c) => Ok(c),
            None => {
                Err(AgentError::Configuration("CDP API credentials not configured".into()).into())
            }
        }
    }

    pub fn warn_missing(&self) {
        if self.gateway_api_key.is_none() {
            tracing::warn!(
                "{} is not set; chat requests will fail until it is configured",
                ENV_AI_GATEWAY_API_KEY
            );
        }
        if self.cdp.is_none() {
            tracing::warn!(
                "{}/{} are not set; agent wallet provisioning is unavailable",
                ENV_CDP_API_KEY_NAME,
                ENV_CDP_API_KEY_SECRET
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub credentials: Arc<Credentials>,
    pub db: DbPool,
    pub args: Arc<ServeArgs>,
    pub health: Arc<UpstreamHealth>,
}

impl AppState {
    pub fn new(client: reqwest::Client, credentials: Credentials, db: DbPool, args: ServeArgs) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            db,
            args: Arc::new(args),
            health: Arc::new(UpstreamHealth::default()),
        }
    }
}
