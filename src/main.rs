use mbx_connector::core::config::{ConfigError, ExchangeConfig};
use mbx_connector::exchanges::binance;
use tracing::{info, warn};

/// Credentials from `{prefix}_*`; read-only testnet when none are set.
///
/// Variables that are present but malformed are an error, not a silent
/// downgrade to read-only.
fn load_config(prefix: &str) -> Result<ExchangeConfig, ConfigError> {
    match ExchangeConfig::from_env(prefix) {
        Ok(config) => Ok(config),
        Err(ConfigError::MissingEnvironmentVariable(_)) => {
            Ok(ExchangeConfig::read_only().testnet(true))
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config("BINANCE").unwrap_or_else(|e| {
        warn!(error = %e, "invalid BINANCE_* configuration, continuing read-only on testnet");
        ExchangeConfig::read_only().testnet(true)
    });

    let client = binance::build_client(&config)?;

    client.ping().await?;
    info!("ping ok");

    let time = client.server_time().await?;
    info!(%time, "server time");

    if config.has_credentials() {
        match client.account(true).await {
            Ok(account) => info!(%account, "account"),
            Err(e) => warn!(error = %e, sent = e.was_sent(), "account request failed"),
        }
    }

    Ok(())
}
