//! Service configuration management
//!
//! One binary hosts every service; `service.kind` picks which one. Settings
//! come from an optional TOML, YAML or JSON file, then `CAMPUS_`-prefixed
//! environment variables with `__` between nested keys:
//!
//! ```text
//! CAMPUS_SERVICE__KIND=student
//! CAMPUS_SERVICE__BIND=0.0.0.0:5003
//! CAMPUS_SERVICE__PUBLIC_BASE_URL=http://student:5003
//! CAMPUS_AUTH__KEYS__PRIVATE_KEY_PATH=/run/secrets/student.pem
//! CAMPUS_AUTH__DISCOVERY__TRUSTED_URIS=http://auth:5001/.well-known/jwks.json,http://student:5003/.well-known/jwks.json
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use campus_auth::{AuthConfig, Role};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CAMPUS";

/// Complete configuration of one service process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Which service this process is and where it listens
    pub service: ServiceSection,
    /// Base URLs of the services this one calls
    pub peers: PeersConfig,
    /// Keys, tokens, discovery, rate limit and client settings
    pub auth: AuthConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Identity and listener of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Service to run
    pub kind: ServiceKind,
    /// Listen address
    pub bind: SocketAddr,
    /// Base URL other services reach this one at; tokens carry its discovery URI
    pub public_base_url: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            kind: ServiceKind::Auth,
            bind: SocketAddr::from(([127, 0, 0, 1], 5001)),
            public_base_url: "http://localhost:5001".to_string(),
        }
    }
}

/// The services one binary can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Issues user tokens after checking credentials
    Auth,
    /// Student records
    Student,
    /// Professor records
    Professor,
    /// Courses
    Course,
    /// Enrollments of students in courses
    Enrollment,
}

impl ServiceKind {
    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Student => "student",
            Self::Professor => "professor",
            Self::Course => "course",
            Self::Enrollment => "enrollment",
        }
    }

    /// Role this service presents when it calls its peers
    pub fn identity(self) -> Role {
        match self {
            Self::Auth => Role::AuthService,
            Self::Student => Role::StudentService,
            Self::Professor => Role::ProfessorService,
            Self::Course => Role::CourseService,
            Self::Enrollment => Role::EnrollmentService,
        }
    }

    /// Peers this service cannot work without
    pub fn required_peers(self) -> &'static [PeerKind] {
        match self {
            Self::Auth => &[PeerKind::Student, PeerKind::Professor],
            Self::Enrollment => &[PeerKind::Student, PeerKind::Course],
            Self::Student | Self::Professor | Self::Course => &[],
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peer services reachable over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    /// Student service
    Student,
    /// Professor service
    Professor,
    /// Course service
    Course,
}

impl PeerKind {
    /// Collection path served by the peer
    pub fn collection_path(self) -> &'static str {
        match self {
            Self::Student => "/students",
            Self::Professor => "/professors",
            Self::Course => "/courses",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
            Self::Course => "course",
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs of peer services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Student service base URL
    pub student: Option<String>,
    /// Professor service base URL
    pub professor: Option<String>,
    /// Course service base URL
    pub course: Option<String>,
}

impl PeersConfig {
    /// Base URL of `peer`, if configured
    pub fn base_url(&self, peer: PeerKind) -> Option<&str> {
        match peer {
            PeerKind::Student => self.student.as_deref(),
            PeerKind::Professor => self.professor.as_deref(),
            PeerKind::Course => self.course.as_deref(),
        }
    }

    /// Collection endpoint of `peer`, if configured
    pub fn collection_url(&self, peer: PeerKind) -> Option<String> {
        self.base_url(peer)
            .map(|base| format!("{}{}", base.trim_end_matches('/'), peer.collection_path()))
    }
}

/// Where log output goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error only
    #[default]
    Stderr,
    /// Rolling files only
    FileOnly,
    /// Standard error and rolling files
    Both,
    /// Logging disabled
    None,
}

/// How often log files roll over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// Every minute
    Minute,
    /// Every hour
    Hourly,
    /// Every day
    Daily,
    /// Single file
    #[default]
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub structured: bool,
    /// Output target
    pub output: LogOutput,
    /// Directory for log files
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// File rotation
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: "campus".to_string(),
            rotation: LogRotation::Never,
        }
    }
}

impl LoggingConfig {
    /// JSON logs to stderr and hourly files under `directory`
    pub fn production(directory: impl Into<PathBuf>) -> Self {
        Self {
            structured: true,
            output: LogOutput::Both,
            directory: Some(directory.into()),
            rotation: LogRotation::Hourly,
            ..Self::default()
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A peer the service depends on has no base URL
    #[error("{kind} service requires peers.{peer} to be set")]
    MissingPeer {
        /// Service being configured
        kind: ServiceKind,
        /// Peer without a base URL
        peer: PeerKind,
    },
}

impl ServiceConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format is taken from the extension. Environment variables with the
    /// `CAMPUS_` prefix override file settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    /// - A required peer is missing
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }

    /// Load from an optional file plus environment overrides
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };
            builder = builder.add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.discovery.trusted_uris"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that every peer the service kind depends on is configured
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPeer`] for the first missing peer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.service.kind;
        for &peer in kind.required_peers() {
            if self.peers.base_url(peer).is_none() {
                return Err(ConfigError::MissingPeer { kind, peer });
            }
        }
        Ok(())
    }
}
