//! Connection parameters taken from the console page's launch context
//!
//! The console page is opened with four query parameters naming the target
//! VM console: `host`, `port`, `password` and `serverId`. They are parsed
//! once into an immutable [`SessionConfig`]; any absent or malformed field is
//! a [`ConfigError`] and no connection is attempted.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use url::Url;

use crate::error::Error;

/// Accepted spellings for each launch parameter, canonical name first
const HOST_KEYS: &[&str] = &["host"];
const PORT_KEYS: &[&str] = &["port"];
const CREDENTIAL_KEYS: &[&str] = &["password", "credential"];
const SERVER_ID_KEYS: &[&str] = &["serverId", "server_id"];

/// Raw key/value pairs the console was launched with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    params: HashMap<String, String>,
}

impl LaunchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string. A leading
    /// `?` is ignored. Repeated keys keep the first value.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        Self { params }
    }

    /// Launch context from the console page URL's query string
    pub fn from_url(page_url: &Url) -> Self {
        Self::from_query(page_url.query().unwrap_or(""))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LaunchContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Opaque session credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret for handing to the protocol session
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Launch parameter that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchField {
    Host,
    Port,
    Credential,
    ServerId,
}

impl fmt::Display for LaunchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchField::Host => write!(f, "host"),
            LaunchField::Port => write!(f, "port"),
            LaunchField::Credential => write!(f, "password"),
            LaunchField::ServerId => write!(f, "serverId"),
        }
    }
}

/// The launch context cannot produce a usable session configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing connection parameters")]
    MissingParameters { field: LaunchField },
}

impl ConfigError {
    /// The first field that failed validation (diagnostics only)
    pub fn missing_field(&self) -> LaunchField {
        match self {
            ConfigError::MissingParameters { field } => *field,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(_: ConfigError) -> Self {
        Error::MissingParameters
    }
}

/// Immutable connection parameters for one mounted console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub credential: Credential,
    pub server_id: String,
}

impl SessionConfig {
    /// Validate the launch context.
    ///
    /// Host, port, credential and server id must all be present and
    /// non-empty; the port must be an integer in `1..=65535`. Reachability
    /// is not checked here.
    pub fn parse(context: &LaunchContext) -> Result<Self, ConfigError> {
        let host = required_trimmed(context, HOST_KEYS, LaunchField::Host)?;
        let port = parse_port(required_trimmed(context, PORT_KEYS, LaunchField::Port)?)?;

        let credential = context
            .first_of(CREDENTIAL_KEYS)
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingParameters {
                field: LaunchField::Credential,
            })?;

        let server_id = required_trimmed(context, SERVER_ID_KEYS, LaunchField::ServerId)?;

        Ok(Self {
            host: host.to_string(),
            port,
            credential: Credential::new(credential),
            server_id: server_id.to_string(),
        })
    }
}

fn required_trimmed<'a>(
    context: &'a LaunchContext,
    keys: &[&str],
    field: LaunchField,
) -> Result<&'a str, ConfigError> {
    context
        .first_of(keys)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingParameters { field })
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::MissingParameters {
            field: LaunchField::Port,
        }),
    }
}
