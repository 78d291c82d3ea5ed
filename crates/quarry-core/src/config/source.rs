//! Data source configuration.
//!
//! A source is either a full connection `url` or the discrete connection
//! fields. Pool sizing and the default per-invocation query ceiling live
//! here too, since each source owns exactly one pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one named data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Database engine.
    pub kind: SourceKind,

    /// Full connection URL. Takes precedence over the discrete fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Hostname of the database server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the database server. Defaults per engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name (file path for sqlite).
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long one acquisition attempt waits for a free connection.
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Default ceiling for a single statement execution.
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    Sqlite,
}

impl SourceKind {
    /// URL scheme understood by the driver.
    pub fn scheme(&self) -> &'static str {
        match self {
            SourceKind::Postgres => "postgres",
            SourceKind::Mysql => "mysql",
            SourceKind::Sqlite => "sqlite",
        }
    }

    fn default_port(&self) -> Option<u16> {
        match self {
            SourceKind::Postgres => Some(5432),
            SourceKind::Mysql => Some(3306),
            SourceKind::Sqlite => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

impl SourceConfig {
    /// Build the driver connection URL.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        if self.kind == SourceKind::Sqlite {
            return format!("sqlite://{}", self.database);
        }

        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(password)
            ),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            _ => String::new(),
        };
        let port = self
            .port
            .or(self.kind.default_port())
            .map(|p| format!(":{}", p))
            .unwrap_or_default();

        format!(
            "{}://{}{}{}/{}",
            self.kind.scheme(),
            credentials,
            self.host,
            port,
            self.database
        )
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        let Some(scheme_end) = url.find("://") else {
            return url;
        };
        let after_scheme = &url[scheme_end + 3..];
        // Query parameters may contain `@`; userinfo may too when the URL
        // was written by hand.
        let authority_and_path = after_scheme.split('?').next().unwrap_or(after_scheme);
        if let Some(at) = authority_and_path.rfind('@')
            && let Some(colon) = after_scheme[..at].find(':')
        {
            return format!(
                "{}://{}:***{}",
                &url[..scheme_end],
                &after_scheme[..colon],
                &after_scheme[at..]
            );
        }
        url
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(30)
}
