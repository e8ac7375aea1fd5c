use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Exchange-side upper bound for `recvWindow`, in milliseconds.
pub const MAX_RECV_WINDOW_MS: u64 = 60_000;

/// Which signature strategy the secret material is meant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Shared secret, HMAC-SHA256, hex output
    #[default]
    Hmac,
    /// PEM private key, RSA PKCS#1 v1.5 SHA-256, base64 output
    Rsa,
    /// PEM or base64 32-byte seed, Ed25519, base64 output
    Ed25519,
}

impl FromStr for KeyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hmac" => Ok(Self::Hmac),
            "rsa" => Ok(Self::Rsa),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "Unknown key type '{}', expected one of hmac, rsa, ed25519",
                other
            ))),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmac => write!(f, "hmac"),
            Self::Rsa => write!(f, "rsa"),
            Self::Ed25519 => write!(f, "ed25519"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub key_type: KeyType,
    pub testnet: bool,
    pub base_url: Option<String>,
    pub ws_api_url: Option<String>,
    pub stream_url: Option<String>,
    pub recv_window: Option<u64>,
    pub timeout_seconds: u64,
}

// Never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 9)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("key_type", &self.key_type)?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_api_url", &self.ws_api_url)?;
        state.serialize_field("stream_url", &self.stream_url)?;
        state.serialize_field("recv_window", &self.recv_window)?;
        state.serialize_field("timeout_seconds", &self.timeout_seconds)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            #[serde(default)]
            key_type: KeyType,
            #[serde(default)]
            testnet: bool,
            base_url: Option<String>,
            ws_api_url: Option<String>,
            stream_url: Option<String>,
            recv_window: Option<u64>,
            timeout_seconds: Option<u64>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        if let Some(window) = helper.recv_window {
            validate_recv_window(window).map_err(serde::de::Error::custom)?;
        }

        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            key_type: helper.key_type,
            testnet: helper.testnet,
            base_url: helper.base_url,
            ws_api_url: helper.ws_api_url,
            stream_url: helper.stream_url,
            recv_window: helper.recv_window,
            timeout_seconds: helper.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        })
    }
}

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

impl ExchangeConfig {
    /// Create a new configuration with HMAC API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            key_type: KeyType::Hmac,
            testnet: false,
            base_url: None,
            ws_api_url: None,
            stream_url: None,
            recv_window: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`
    /// - `{PREFIX}_SECRET_KEY` (HMAC secret, or PEM / base64 private key)
    /// - `{PREFIX}_KEY_TYPE` (optional: `hmac`, `rsa`, `ed25519`; defaults to `hmac`)
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    /// - `{PREFIX}_BASE_URL` (optional)
    /// - `{PREFIX}_RECV_WINDOW` (optional, milliseconds)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let key_type = match env::var(format!("{}_KEY_TYPE", prefix)) {
            Ok(value) => value.parse()?,
            Err(_) => KeyType::Hmac,
        };

        let testnet = env::var(format!("{}_TESTNET", prefix))
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let recv_window = match env::var(format!("{}_RECV_WINDOW", prefix)) {
            Ok(value) => {
                let window = value.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidConfiguration(format!(
                        "Invalid {}_RECV_WINDOW '{}': {}",
                        prefix, value, e
                    ))
                })?;
                validate_recv_window(window)?;
                Some(window)
            }
            Err(_) => None,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            key_type,
            testnet,
            base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
            ws_api_url: env::var(format!("{}_WS_API_URL", prefix)).ok(),
            stream_url: env::var(format!("{}_STREAM_URL", prefix)).ok(),
            recv_window,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        })
    }

    /// Create configuration from a `.env` file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific `.env` file path
    ///
    /// A missing file is not an error; system environment variables are used instead.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Check if this configuration has credentials for signed operations
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub const fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn ws_api_url(mut self, ws_api_url: String) -> Self {
        self.ws_api_url = Some(ws_api_url);
        self
    }

    #[must_use]
    pub fn stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    #[must_use]
    pub const fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the default `recvWindow` applied to signed calls that do not override it
    pub fn recv_window(mut self, recv_window: u64) -> Result<Self, ConfigError> {
        validate_recv_window(recv_window)?;
        self.recv_window = Some(recv_window);
        Ok(self)
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

pub(crate) fn validate_recv_window(recv_window: u64) -> Result<(), ConfigError> {
    if recv_window == 0 || recv_window > MAX_RECV_WINDOW_MS {
        return Err(ConfigError::InvalidConfiguration(format!(
            "recvWindow must be between 1 and {} ms, got {}",
            MAX_RECV_WINDOW_MS, recv_window
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
