//! CLI arguments, configuration files and validated server settings.

use clap::{Parser, ValueEnum};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use shadow_rs::formatcp;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 9980;
pub const DEFAULT_AUTH_REALM: &str = "Image Upload";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_SITE: &str = "defaultSite";
pub const DEFAULT_CAMERA: &str = "defaultCamera";
pub const EXPECTED_CONTENT_TYPE: &str = "image/jpeg";
pub const MAX_NAME_COLLISIONS: u32 = 1000;

/// CLI arguments and environment overrides for the server.
///
/// Every setting is optional here so that values from configuration files
/// are only replaced when the option was actually given.
#[derive(Parser, Debug, Default)]
#[command(
    name = "axis-camera-upload",
    version = VERSION_INFO,
    about = "Image upload server for network cameras"
)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config-file",
        env = "CAM_UPLOAD_CONFIG",
        value_delimiter = ',',
        help = "Load configuration data from a file (repeatable, later files win)"
    )]
    pub config_files: Vec<PathBuf>,
    #[arg(long, env = "CAM_UPLOAD_PATH", help = "Base directory for stored images")]
    pub upload_path: Option<PathBuf>,
    #[arg(
        long,
        value_enum,
        env = "CAM_UPLOAD_AUTH",
        help = "Authentication mode for uploads"
    )]
    pub auth_mode: Option<AuthMode>,
    #[arg(long, env = "CAM_UPLOAD_TOKEN", help = "Expected upload token (token mode)")]
    pub upload_token: Option<String>,
    #[arg(long, env = "CAM_UPLOAD_USER", help = "Expected username (basic mode)")]
    pub upload_username: Option<String>,
    #[arg(long, env = "CAM_UPLOAD_PASS", help = "Expected password (basic mode)")]
    pub upload_password: Option<String>,
    #[arg(long, env = "CAM_UPLOAD_REALM", help = "Realm sent with Basic challenges")]
    pub upload_realm: Option<String>,
    #[arg(short = 'b', long, env = "CAM_UPLOAD_BIND", help = "Bind address for HTTP")]
    pub host: Option<String>,
    #[arg(short = 'p', long, env = "CAM_UPLOAD_HTTP_PORT", help = "HTTP port")]
    pub http_port: Option<u16>,
    #[arg(
        long,
        env = "CAM_UPLOAD_LOG_LEVEL",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Default log filter when RUST_LOG is not set"
    )]
    pub log_level: String,
}

/// How upload requests prove who they are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `?token=...` query parameter.
    Token,
    /// HTTP Basic `Authorization` header.
    Basic,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Token => "token",
            AuthMode::Basic => "basic",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub http: HttpSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub auth: Option<AuthMode>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub realm: String,
}

impl UploadSettings {
    /// Explicit `upload.auth`, otherwise basic when a username is configured.
    pub fn auth_mode(&self) -> AuthMode {
        match (self.auth, &self.username) {
            (Some(mode), _) => mode,
            (None, Some(_)) => AuthMode::Basic,
            (None, None) => AuthMode::Token,
        }
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Source(ConfigError),
    WorkingDir(io::Error),
    Missing(&'static str),
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Source(err) => write!(f, "invalid configuration: {err}"),
            SettingsError::WorkingDir(err) => {
                write!(f, "cannot determine working directory: {err}")
            }
            SettingsError::Missing(key) => write!(f, "configuration key `{key}` must be set"),
            SettingsError::Invalid { key, reason } => {
                write!(f, "configuration key `{key}` is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<ConfigError> for SettingsError {
    fn from(err: ConfigError) -> Self {
        SettingsError::Source(err)
    }
}

impl Settings {
    /// Layers defaults, configuration files and CLI/env overrides, then validates.
    pub fn load(args: &Args) -> Result<Self, SettingsError> {
        let cwd = std::env::current_dir().map_err(SettingsError::WorkingDir)?;
        let mut builder = Config::builder()
            .set_default("upload.path", cwd.to_string_lossy().into_owned())?
            .set_default("upload.realm", DEFAULT_AUTH_REALM)?
            .set_default("http.host", DEFAULT_HTTP_HOST)?
            .set_default("http.port", i64::from(DEFAULT_HTTP_PORT))?;

        for path in &args.config_files {
            builder = builder.add_source(File::from(path.as_path()));
        }

        let settings: Settings = builder
            .set_override_option(
                "upload.path",
                args.upload_path
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
            )?
            .set_override_option("upload.auth", args.auth_mode.map(AuthMode::as_str))?
            .set_override_option("upload.token", args.upload_token.clone())?
            .set_override_option("upload.username", args.upload_username.clone())?
            .set_override_option("upload.password", args.upload_password.clone())?
            .set_override_option("upload.realm", args.upload_realm.clone())?
            .set_override_option("http.host", args.host.clone())?
            .set_override_option("http.port", args.http_port.map(i64::from))?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !is_valid_realm(&self.upload.realm) {
            return Err(SettingsError::Invalid {
                key: "upload.realm",
                reason: "must not contain quotes, backslashes or control characters",
            });
        }

        let is_blank = |value: &Option<String>| value.as_deref().is_none_or(str::is_empty);
        match self.upload.auth_mode() {
            AuthMode::Token if is_blank(&self.upload.token) => {
                Err(SettingsError::Missing("upload.token"))
            }
            AuthMode::Basic if is_blank(&self.upload.username) => {
                Err(SettingsError::Missing("upload.username"))
            }
            _ => Ok(()),
        }
    }
}

/// The realm is sent verbatim inside a quoted `WWW-Authenticate` parameter.
fn is_valid_realm(realm: &str) -> bool {
    !realm
        .chars()
        .any(|ch| ch == '"' || ch == '\\' || ch.is_control())
}
