//! Configuration management for grpc-guard

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::jwt::{DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// gRPC server host
    pub grpc_host: String,
    /// gRPC server port
    pub grpc_port: u16,
    /// Token signing configuration
    pub jwt: JwtConfig,
    /// Certificate material for mutual TLS
    pub tls: TlsConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Clone)]
pub struct JwtConfig {
    /// Shared HMAC secret
    pub secret: String,
    pub token_ttl_secs: i64,
}

// The secret must never end up in logs.
impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Paths of the PEM files used to build mutual-TLS credentials
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Certificate of the authority that signs peer certificates
    pub ca_cert_path: PathBuf,
    /// Server certificate presented during the handshake
    pub cert_path: PathBuf,
    /// Server private key
    pub key_path: PathBuf,
    /// Client certificate, used when acting as the calling side
    pub client_cert_path: PathBuf,
    /// Client private key
    pub client_key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert_path: PathBuf::from("cert/ca-cert.pem"),
            cert_path: PathBuf::from("cert/server-cert.pem"),
            key_path: PathBuf::from("cert/server-key.pem"),
            client_cert_path: PathBuf::from("cert/client-cert.pem"),
            client_key_path: PathBuf::from("cert/client-key.pem"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            service_name: "grpc-guard".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_process_env()
    }

    /// Load configuration, requiring a `.env` file in the working directory.
    pub fn read() -> Result<Self> {
        dotenvy::from_path(".env").context("loading env vars from .env file")?;
        Self::from_process_env()
    }

    /// Load configuration from the given env file.
    ///
    /// Variables already set in the process take precedence over the file,
    /// and the file's values are not exported to the process.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file: HashMap<String, String> = dotenvy::from_path_iter(path)
            .with_context(|| format!("loading env vars from {}", path.display()))?
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("parsing env vars from {}", path.display()))?;

        Self::from_lookup(|key| env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    fn from_process_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = TlsConfig::default();
        let path = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let secret = var("JWT_KEY").context("JWT_KEY is required")?;
        if secret.is_empty() {
            bail!("JWT_KEY must not be empty");
        }

        Ok(Self {
            grpc_host: var("GRPC_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            grpc_port: var("GRPC_PORT")
                .unwrap_or_else(|| "4444".to_string())
                .parse()
                .context("Invalid GRPC_PORT")?,
            jwt: JwtConfig {
                secret,
                token_ttl_secs: match var("JWT_TOKEN_TTL_SECS") {
                    Some(value) => parse_ttl(&value)?,
                    None => DEFAULT_TOKEN_TTL_SECS,
                },
            },
            tls: TlsConfig {
                ca_cert_path: path("GRPC_TLS_CA_CERT_PATH", defaults.ca_cert_path),
                cert_path: path("GRPC_TLS_CERT_PATH", defaults.cert_path),
                key_path: path("GRPC_TLS_KEY_PATH", defaults.key_path),
                client_cert_path: path("GRPC_TLS_CLIENT_CERT_PATH", defaults.client_cert_path),
                client_key_path: path("GRPC_TLS_CLIENT_KEY_PATH", defaults.client_key_path),
            },
            telemetry: TelemetryConfig {
                log_format: var("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
                service_name: var("SERVICE_NAME").unwrap_or_else(|| "grpc-guard".to_string()),
            },
        })
    }

    /// Get gRPC server address
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.grpc_host, self.grpc_port)
    }
}

fn parse_ttl(value: &str) -> Result<i64> {
    let ttl: i64 = value.parse().context("Invalid JWT_TOKEN_TTL_SECS")?;
    if !(1..=MAX_TOKEN_TTL_SECS).contains(&ttl) {
        bail!(
            "JWT_TOKEN_TTL_SECS must be between 1 and {}, got {}",
            MAX_TOKEN_TTL_SECS,
            ttl
        );
    }
    Ok(ttl)
}
