//! Runtime configuration from the environment.
//!
//! Values come from process environment variables (a `.env` file is loaded
//! by the binary first). The staging location is required; everything else
//! has a default.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::analytics::cache::DEFAULT_TTL;
use crate::analytics::derive::PercentileMethod;
use crate::warehouse::Dialect;

pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_STAGING: &str = "ATHENA_S3_OUTPUT";
pub const ENV_WORKGROUP: &str = "ATHENA_WORKGROUP";
pub const ENV_DATABASE: &str = "ATHENA_DATABASE";
pub const ENV_CATALOG: &str = "ATHENA_CATALOG";
pub const ENV_WAREHOUSE_PATH: &str = "STAFFING_WAREHOUSE_PATH";
pub const ENV_CACHE_TTL: &str = "STAFFING_CACHE_TTL_SECS";
pub const ENV_PERCENTILE: &str = "STAFFING_PERCENTILE";
pub const ENV_DIALECT: &str = "STAFFING_SQL_DIALECT";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_WORKGROUP: &str = "primary";
const DEFAULT_DATABASE: &str = "kerok-healthcare-bronze";
const DEFAULT_CATALOG: &str = "AwsDataCatalog";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub region: String,
    /// Query-result staging location; also the default export directory.
    pub staging: String,
    pub workgroup: String,
    pub database: String,
    pub catalog: String,
    /// Local SQLite mirror of the gold views.
    pub warehouse_path: PathBuf,
    #[serde(serialize_with = "serialize_secs")]
    pub cache_ttl: Duration,
    pub percentile: PercentileMethod,
    pub dialect: Dialect,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| dotenvy::var(name).ok())
    }

    /// Load through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let staging = get(ENV_STAGING).ok_or(ConfigError::Missing(ENV_STAGING))?;
        let region = get(ENV_REGION)
            .or_else(|| get(ENV_DEFAULT_REGION))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let workgroup = get(ENV_WORKGROUP).unwrap_or_else(|| DEFAULT_WORKGROUP.to_string());
        let database = get(ENV_DATABASE).unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let catalog = get(ENV_CATALOG).unwrap_or_else(|| DEFAULT_CATALOG.to_string());
        let warehouse_path = get(ENV_WAREHOUSE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{database}.db")));

        let cache_ttl = match get(ENV_CACHE_TTL) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    name: ENV_CACHE_TTL,
                    message: format!("'{raw}': {e}"),
                })?,
            None => DEFAULT_TTL,
        };
        let percentile = parse_or_default(get(ENV_PERCENTILE), ENV_PERCENTILE)?;
        let dialect = parse_or_default(get(ENV_DIALECT), ENV_DIALECT)?;

        Ok(Self {
            region,
            staging,
            workgroup,
            database,
            catalog,
            warehouse_path,
            cache_ttl,
            percentile,
            dialect,
        })
    }

    /// Caption naming where the data came from.
    pub fn footer(&self) -> String {
        format!(
            "Views queried from the gold layer • Workgroup: {} • Database: {} • Catalog: {} • Region: {}",
            self.workgroup, self.database, self.catalog, self.region
        )
    }

    /// Directory CSV exports go to when no path is given.
    ///
    /// A plain path or `file://` URL is used as-is; remote locations such as
    /// `s3://` cannot be written locally, so exports fall back to the current
    /// directory.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(path) = self.staging.strip_prefix("file://") {
            return PathBuf::from(path);
        }
        if self.staging.contains("://") {
            tracing::info!(
                target: "staffing::config",
                staging = %self.staging,
                "staging location is remote; exporting to the current directory"
            );
            return PathBuf::from(".");
        }
        PathBuf::from(&self.staging)
    }
}

fn parse_or_default<T>(raw: Option<String>, name: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String> + Default,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|message| ConfigError::Invalid { name, message }),
        None => Ok(T::default()),
    }
}
