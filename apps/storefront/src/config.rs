//! # Storefront Configuration
//!
//! Configuration loaded at startup.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BASKET_API_URL=https://shop.example.com/api                        │
//! │     BASKET_DB_PATH=/tmp/basket.db                                      │
//! │     BASKET_TAX_PERCENT=15                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/storefront/storefront.toml (Linux)                       │
//! │     ~/Library/Application Support/com.basket.storefront/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [api]
//! base_url = "https://shop.example.com/api"
//! timeout_secs = 10
//!
//! [storage]
//! database_path = "/var/lib/basket/basket.db"
//!
//! [tax.default]
//! kind = "percentage"
//! rate = 1500          # basis points
//!
//! [tax.regions.neom]
//! kind = "none"
//!
//! [currency]
//! symbol = "SAR"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use basket_core::{Money, Percent, RegionalTax, TaxPolicy};

/// Hard ceiling for configured tax percentages.
const MAX_TAX_BPS: u32 = 10_000;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the platform data directory")]
    NoProjectDirs,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// Storefront API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
}

/// How amounts are shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub symbol: String,

    /// Put the symbol after the amount ("12.50 SAR").
    pub symbol_after: bool,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig {
            symbol: "SAR".to_string(),
            symbol_after: false,
        }
    }
}

impl CurrencyConfig {
    /// Formats an amount for display.
    pub fn format(&self, amount: Money) -> String {
        if self.symbol_after {
            format!("{} {}", amount, self.symbol)
        } else {
            format!("{} {}", self.symbol, amount)
        }
    }
}

// =============================================================================
// Storefront Configuration
// =============================================================================

/// Everything the storefront needs at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    /// Order-level tax, per delivery city.
    pub tax: RegionalTax,
    pub currency: CurrencyConfig,
}

impl StorefrontConfig {
    /// Loads configuration from `path`, then environment overrides, then
    /// validates.
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "Loaded config file");
            Self::from_toml(&text)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `BASKET_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup.
    ///
    /// ## Keys
    /// - `BASKET_API_URL`: API base URL
    /// - `BASKET_DB_PATH`: SQLite file
    /// - `BASKET_TAX_PERCENT`: default tax as a decimal percent ("15", "8.25");
    ///   `0` disables the default tax
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASKET_API_URL") {
            self.api.base_url = url;
        }

        if let Some(path) = lookup("BASKET_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(percent) = lookup("BASKET_TAX_PERCENT") {
            let rate = Percent::parse_decimal(&percent).map_err(|e| {
                ConfigError::Invalid(format!("BASKET_TAX_PERCENT: {}", e))
            })?;
            self.tax.default = if rate.is_zero() {
                TaxPolicy::None
            } else {
                TaxPolicy::Percentage { rate }
            };
        }

        Ok(())
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".into()));
        }

        validate_policy("tax.default", &self.tax.default)?;
        for (region, policy) in &self.tax.regions {
            validate_policy(&format!("tax.regions.{}", region), policy)?;
        }

        Ok(())
    }

    /// The SQLite file to open, creating its directory if needed.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.storage.database_path {
            return Ok(path.clone());
        }

        let dirs = project_dirs()?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|source| ConfigError::Read {
            path: data_dir.to_path_buf(),
            source,
        })?;
        Ok(data_dir.join("basket.db"))
    }
}

fn validate_policy(name: &str, policy: &TaxPolicy) -> ConfigResult<()> {
    match policy {
        TaxPolicy::Percentage { rate } if rate.bps() > MAX_TAX_BPS => Err(ConfigError::Invalid(
            format!("{} rate {} is above 100%", name, rate),
        )),
        TaxPolicy::Fixed { amount } if amount.is_negative() => Err(ConfigError::Invalid(
            format!("{} amount must not be negative", name),
        )),
        _ => Ok(()),
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "basket", "storefront").ok_or(ConfigError::NoProjectDirs)
}

/// Platform default location of `storefront.toml`.
///
/// ## Platform-Specific Paths
/// - **Linux**: `~/.config/storefront/storefront.toml`
/// - **macOS**: `~/Library/Application Support/com.basket.storefront/storefront.toml`
/// - **Windows**: `%APPDATA%\basket\storefront\config\storefront.toml`
pub fn default_config_path() -> ConfigResult<PathBuf> {
    Ok(project_dirs()?.config_dir().join("storefront.toml"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::TaxRule;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = StorefrontConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tax.default, TaxPolicy::None);
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_toml_with_regions() {
        let config = StorefrontConfig::from_toml(
            r#"
            [api]
            base_url = "https://shop.example.com/api"

            [tax.default]
            kind = "percentage"
            rate = 1500

            [tax.regions.neom]
            kind = "none"

            [tax.regions.abha]
            kind = "fixed"
            amount = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://shop.example.com/api");
        // Untouched sections keep their defaults
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.currency.symbol, "SAR");

        let subtotal = Money::from_cents(10000);
        assert_eq!(config.tax.tax(subtotal, Some("riyadh")).cents(), 1500);
        assert_eq!(config.tax.tax(subtotal, Some("neom")).cents(), 0);
        assert_eq!(config.tax.tax(subtotal, Some("abha")).cents(), 250);
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            StorefrontConfig::from_toml("[api]\ntimeout_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StorefrontConfig::default();
        config
            .apply_overrides(lookup(&[
                ("BASKET_API_URL", "https://api.example.com"),
                ("BASKET_DB_PATH", "/tmp/cart.db"),
                ("BASKET_TAX_PERCENT", "8.25"),
            ]))
            .unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.storage.database_path, Some(PathBuf::from("/tmp/cart.db")));
        assert_eq!(
            config.tax.default,
            TaxPolicy::Percentage {
                rate: Percent::from_bps(825)
            }
        );
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/cart.db"));
    }

    #[test]
    fn test_zero_tax_override_disables_tax() {
        let mut config = StorefrontConfig::default();
        config.tax.default = TaxPolicy::Percentage {
            rate: Percent::from_whole(15),
        };
        config
            .apply_overrides(lookup(&[("BASKET_TAX_PERCENT", "0")]))
            .unwrap();
        assert_eq!(config.tax.default, TaxPolicy::None);
    }

    #[test]
    fn test_bad_tax_override_rejected() {
        let mut config = StorefrontConfig::default();
        let result = config.apply_overrides(lookup(&[("BASKET_TAX_PERCENT", "fifteen")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StorefrontConfig::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.tax = RegionalTax::uniform(TaxPolicy::None).with_region(
            "riyadh",
            TaxPolicy::Percentage {
                rate: Percent::from_whole(150),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("missing-{}.toml", uuid::Uuid::new_v4()));
        let config = StorefrontConfig::load(&path).unwrap();
        assert_eq!(config.currency, CurrencyConfig::default());
    }

    #[test]
    fn test_currency_format() {
        let mut currency = CurrencyConfig::default();
        assert_eq!(currency.format(Money::from_cents(1250)), "SAR 12.50");
        currency.symbol_after = true;
        assert_eq!(currency.format(Money::from_cents(1250)), "12.50 SAR");
    }
}
