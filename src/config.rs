use crate::acs::auth::{self, AcsCredentials};

/// Default system prompt for the realtime session. Overridable with
/// AGENT_INSTRUCTIONS for deployment-specific scripts.
const DEFAULT_INSTRUCTIONS: &str = "First thing, let the caller know this call may be recorded. \
You are a phone voice assistant. Keep answers short and conversational. \
If the caller drifts off-topic, politely steer them back to the purpose of the call.";

const DEFAULT_VOICE: &str = "shimmer";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub acs: AcsConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL ACS can reach, e.g. an ngrok or App Service host.
    pub callback_host: String,
}

impl ServerConfig {
    /// URL ACS delivers call lifecycle events to.
    pub fn callback_url(&self) -> String {
        format!("{}/api/callbacks", self.callback_host.trim_end_matches('/'))
    }

    /// Transport URL for the bidirectional media stream (wss scheme).
    pub fn websocket_url(&self) -> String {
        format!(
            "{}/ws",
            self.callback_host
                .trim_end_matches('/')
                .replace("https://", "wss://")
                .replace("http://", "ws://")
        )
    }
}

#[derive(Debug, Clone)]
pub struct AcsConfig {
    pub connection: AcsCredentials,
    /// ACS-purchased caller id number.
    pub source_number: String,
    /// Number dialed by GET /outboundCall.
    pub target_number: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub voice: String,
    pub instructions: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },
    #[error("malformed ACS connection string: {0}")]
    ConnectionString(String),
}

impl Config {
    /// Load configuration from the environment, reading a .env file first
    /// if one is present. Missing required variables abort startup.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded .env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!("No .env file, using environment only");
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let connection = auth::parse_connection_string(&require("ACS_CONNECTION_STRING")?)
            .map_err(|e| ConfigError::ConnectionString(e.to_string()))?;

        let port = match std::env::var("PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidVar {
                var: "PORT",
                reason: format!("not a port number: {v}"),
            })?,
            Err(_) => 8080,
        };

        Ok(Config {
            server: ServerConfig {
                host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                callback_host: require("CALLBACK_URI_HOST")?,
            },
            acs: AcsConfig {
                connection,
                source_number: require("ACS_PHONE_NUMBER")?,
                target_number: require("TARGET_PHONE_NUMBER")?,
            },
            openai: OpenAiConfig {
                endpoint: require("AZURE_OPENAI_SERVICE_ENDPOINT")?,
                api_key: require("AZURE_OPENAI_SERVICE_KEY")?,
                deployment: require("AZURE_OPENAI_DEPLOYMENT_MODEL_NAME")?,
                voice: std::env::var("AGENT_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string()),
                instructions: std::env::var("AGENT_INSTRUCTIONS")
                    .unwrap_or_else(|_| DEFAULT_INSTRUCTIONS.to_string()),
            },
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_config(callback_host: &str) -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            callback_host: callback_host.to_string(),
        }
    }

    #[test]
    fn callback_url_appends_path() {
        let cfg = server_config("https://example.ngrok.io");
        assert_eq!(cfg.callback_url(), "https://example.ngrok.io/api/callbacks");
    }

    #[test]
    fn callback_url_tolerates_trailing_slash() {
        let cfg = server_config("https://example.ngrok.io/");
        assert_eq!(cfg.callback_url(), "https://example.ngrok.io/api/callbacks");
    }

    #[test]
    fn websocket_url_swaps_scheme() {
        let cfg = server_config("https://example.ngrok.io");
        assert_eq!(cfg.websocket_url(), "wss://example.ngrok.io/ws");

        let cfg = server_config("http://localhost:8080");
        assert_eq!(cfg.websocket_url(), "ws://localhost:8080/ws");
    }
}
