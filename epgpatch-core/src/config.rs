//! Immutable run configuration. Defaults reproduce the stock 五星体育 setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::ports::PortError;

/// Longest duration accepted for the last scraped programme.
pub const MAX_FALLBACK_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
/// Complete configuration of an epgpatch run.
pub struct GuideConfig {
    /// Listing site the injected channel is scraped from.
    pub listings: ListingsConfig,
    /// Baseline guide and merge rules.
    pub merge: MergeConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Where and how the listing site is queried.
pub struct ListingsConfig {
    /// Scheme and host of the listing site, without trailing slash.
    pub base_url: String,
    /// Station code (`tc` form field).
    pub station: String,
    /// Sub-channel code (`cc` form field).
    pub subchannel: String,
    /// Purpose sent with the token request (`p` form field).
    pub token_scope: String,
    /// User agent presented to the listing site.
    pub user_agent: String,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.tvmao.com".to_owned(),
            station: "SHHAI".to_owned(),
            subchannel: "SHHAI5".to_owned(),
            token_scope: "channelEpg".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Baseline source, output location and channel rules.
pub struct MergeConfig {
    /// URL of the baseline XMLTV document.
    pub baseline_url: String,
    /// File the merged guide is written to.
    pub output_path: PathBuf,
    /// Baseline channels that survive the merge.
    pub whitelist: Vec<String>,
    /// Channel id the scraped schedule is published under.
    pub injected_channel: String,
    /// Language tag for `display-name` and `title` elements.
    pub lang: String,
    /// Duration given to the last scraped programme, which has no successor.
    pub fallback_minutes: i64,
}

impl MergeConfig {
    /// Duration given to the last scraped programme.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidConfig`] unless `fallback_minutes` lies in
    /// `1..=`[`MAX_FALLBACK_MINUTES`].
    pub fn fallback(&self) -> Result<TimeDelta, PortError> {
        if !(1..=MAX_FALLBACK_MINUTES).contains(&self.fallback_minutes) {
            return Err(PortError::InvalidConfig(format!(
                "fallback_minutes must be between 1 and {MAX_FALLBACK_MINUTES}, got {}",
                self.fallback_minutes
            )));
        }
        TimeDelta::try_minutes(self.fallback_minutes).ok_or_else(|| {
            PortError::InvalidConfig(format!(
                "fallback_minutes {} is out of range",
                self.fallback_minutes
            ))
        })
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            baseline_url: "https://live.fanmingming.cn/e.xml".to_owned(),
            output_path: PathBuf::from("最终_e.xml"),
            whitelist: ["东方卫视", "上视新闻", "上海都市", "生活时尚", "东方影视"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            injected_channel: "五星体育".to_owned(),
            lang: "zh".to_owned(),
            fallback_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// HTTP client settings shared by all requests.
pub struct HttpConfig {
    /// Upper bound for each request, in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GuideConfig {
    /// Load configuration from a TOML file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Io`] when the file exists but cannot be read and
    /// [`PortError::Config`] when it is not valid TOML for this structure.
    pub fn load(path: &Path) -> Result<Self, PortError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] on invalid TOML and [`PortError::InvalidConfig`]
    /// when a value is out of range.
    pub fn from_toml(contents: &str) -> Result<Self, PortError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the TOML types alone cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidConfig`] for the first offending value.
    pub fn validate(&self) -> Result<(), PortError> {
        self.merge.fallback()?;
        Ok(())
    }
}
