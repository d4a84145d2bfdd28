use crate::cli::Network;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SETTINGS_FILE_NAME: &str = "payroll-settings.toml";

/// Reconciling every organization runs every 10 minutes on mainnet
const ORG_SYNC_SCHEDULE_MAINNET: &str = "0 */10 * * * *";
/// Reconciling every organization runs every 2 minutes on testnet
const ORG_SYNC_SCHEDULE_TESTNET: &str = "0 */2 * * * *";

/// Top-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// `SettleDelay` used for new channels unless the caller overrides it.
    pub channel_default_settle_delay_seconds: i64,
    /// `CancelAfter` failsafe applied to new channels, seconds from create.
    pub channel_default_cancel_after_seconds: i64,
    pub max_daily_hours_per_channel: u32,
    /// A channel is not re-synced against the ledger within this interval.
    pub reconcile_min_interval_seconds: u64,
    /// Backoff schedule of the channel-id resolver's account_channels
    /// fallback, one entry per attempt.
    pub resolver_retry_schedule_seconds: Vec<u64>,
    pub signing_gateway_deadline_seconds: u64,
    /// How many per-channel syncs an organization-wide sync runs at once.
    pub sync_all_concurrency: usize,

    // Special parameter, where the settings file is located
    pub path: Option<PathBuf>,

    /// We don't want the below doc block be formatted
    #[rustfmt::skip]
    /// A cron syntax for the periodic organization-wide ledger reconciliation
    ///
    /// The format is :
    /// sec   min   hour   day of month   month   day of week   year
    /// *     *     *      *              *       *             *
    pub organization_sync_scheduler: String,
}

impl Settings {
    fn default(network: Network) -> Self {
        let organization_sync_scheduler = match network {
            Network::Testnet => ORG_SYNC_SCHEDULE_TESTNET,
            Network::Mainnet => ORG_SYNC_SCHEDULE_MAINNET,
        }
        .to_string();
        Self {
            channel_default_settle_delay_seconds: 86_400,
            channel_default_cancel_after_seconds: 86_400,
            max_daily_hours_per_channel: 8,
            reconcile_min_interval_seconds: 60,
            resolver_retry_schedule_seconds: vec![1, 2, 4, 8, 16],
            signing_gateway_deadline_seconds: 300,
            sync_all_concurrency: 8,
            path: None,
            organization_sync_scheduler,
        }
    }

    pub fn resolver_retry_schedule(&self) -> Vec<Duration> {
        self.resolver_retry_schedule_seconds
            .iter()
            .map(|seconds| Duration::from_secs(*seconds))
            .collect()
    }

    pub fn reconcile_min_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_min_interval_seconds)
    }

    pub fn signing_gateway_deadline(&self) -> Duration {
        Duration::from_secs(self.signing_gateway_deadline_seconds)
    }
}

async fn read_settings(data_dir: &Path) -> Result<Settings> {
    let settings_path = data_dir.join(SETTINGS_FILE_NAME);
    let data = fs::read_to_string(settings_path).await?;
    toml::from_str(&data).context("Unable to parse settings file")
}

impl Settings {
    pub async fn new(data_dir: &Path, network: Network) -> Self {
        match read_settings(data_dir).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Unable to read {SETTINGS_FILE_NAME} file, using defaults: {e}");
                let new = Settings {
                    path: Some(data_dir.join(SETTINGS_FILE_NAME)),
                    ..Settings::default(network)
                };
                if let Err(e) = new.write_to_file().await {
                    tracing::error!("Unable to write default settings to file: {e}");
                } else {
                    tracing::info!("Default settings written to file");
                }
                new
            }
        }
    }

    pub async fn write_to_file(&self) -> Result<()> {
        let data =
            toml::to_string_pretty(&self).context("Unable to serialize settings to TOML format")?;

        let settings_path = self.path.as_ref().context("Settings path not set")?.clone();
        let mut file = fs::File::create(settings_path).await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = Settings::default(Network::Testnet);
        assert_eq!(settings.channel_default_settle_delay_seconds, 86_400);
        assert_eq!(settings.channel_default_cancel_after_seconds, 86_400);
        assert_eq!(settings.max_daily_hours_per_channel, 8);
        assert_eq!(settings.reconcile_min_interval_seconds, 60);
        assert_eq!(settings.resolver_retry_schedule_seconds, vec![1, 2, 4, 8, 16]);
        assert_eq!(settings.signing_gateway_deadline_seconds, 300);
        assert_eq!(settings.sync_all_concurrency, 8);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default(Network::Mainnet);
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(
            parsed.resolver_retry_schedule_seconds,
            settings.resolver_retry_schedule_seconds
        );
        assert_eq!(
            parsed.organization_sync_scheduler,
            settings.organization_sync_scheduler
        );
    }
}
