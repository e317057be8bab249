//! Connection configuration: sources, overrides and precedence resolution.
//!
//! A [`ConnectionDescriptor`] is produced by [`ConfigResolver::resolve`] from
//! two inputs:
//!
//! - explicit call-site overrides ([`ConnectOptions`]), and
//! - a [`ConfigSource`] offering dotted-key lookups such as `database.host`.
//!
//! Every field is resolved independently with the precedence
//! override → config source → built-in default. Resolution never fails; a
//! descriptor that is unusable is rejected later by the connector.
//!
//! # Example
//!
//! ```ignore
//! use crawldb_core::config::{ConfigResolver, ConnectOptions, ValueConfigSource};
//!
//! let source = ValueConfigSource::from_toml_str(r#"
//!     [database]
//!     host = "mongo.internal"
//!     db = "crawler"
//! "#)?;
//!
//! let descriptor = ConfigResolver::default()
//!     .resolve(&ConnectOptions::new().with_port(27018), &source);
//!
//! assert_eq!(descriptor.host, "mongo.internal");
//! assert_eq!(descriptor.port, 27018);
//! ```

use std::{collections::BTreeMap, fmt, path::Path};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Application name used as the default database name and reported to the server.
pub const DEFAULT_APP_NAME: &str = "crawldb";
/// Default host when neither an override nor the config source provides one.
pub const DEFAULT_HOST: &str = "localhost";
/// Default port when neither an override nor the config source provides one.
pub const DEFAULT_PORT: u16 = 27017;
/// Default authentication database.
pub const DEFAULT_AUTH_SOURCE: &str = "admin";

/// Dotted configuration keys read by the resolver.
pub mod keys {
    pub const URI: &str = "database.uri";
    pub const HOST: &str = "database.host";
    pub const PORT: &str = "database.port";
    pub const DB: &str = "database.db";
    pub const HOSTS: &str = "database.hosts";
    pub const USERNAME: &str = "database.username";
    pub const PASSWORD: &str = "database.password";
    pub const AUTH_SOURCE: &str = "database.authSource";
    pub const AUTH_MECHANISM: &str = "database.authMechanism";
    pub const AUTH_MECHANISM_PROPERTIES: &str = "database.authMechanismProperties";
}

/// Errors raised while loading a configuration source.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to convert config tree: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only key/value lookup with dotted keys.
///
/// Implementations return `None` for missing keys. Empty strings are treated as
/// missing by the resolver, so sources do not need to filter them.
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Looks up a scalar value rendered as a string.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Looks up a list of strings.
    fn get_string_list(&self, key: &str) -> Option<Vec<String>>;

    /// Looks up a string-to-string map.
    fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>>;
}

impl<S: ConfigSource + ?Sized> ConfigSource for &S {
    fn get_string(&self, key: &str) -> Option<String> {
        (**self).get_string(key)
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        (**self).get_string_list(key)
    }

    fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        (**self).get_string_map(key)
    }
}

/// A configuration tree held in memory.
///
/// Backed by a JSON value so it can be loaded from TOML or JSON documents, or
/// filled programmatically with [`ValueConfigSource::set`].
#[derive(Debug, Clone, Default)]
pub struct ValueConfigSource {
    root: Value,
}

impl ValueConfigSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self { root: Value::Object(Map::new()) }
    }

    /// Wraps an existing JSON tree.
    pub fn from_json(root: Value) -> Self {
        Self { root }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: toml::Value = toml::from_str(input)?;

        Ok(Self { root: serde_json::to_value(parsed)? })
    }

    /// Reads and parses a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Sets a value at a dotted key, creating intermediate tables as needed.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let mut current = &mut self.root;

        for segment in key.split('.') {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current = current
                .as_object_mut()
                .expect("value was just made an object")
                .entry(segment.to_string())
                .or_insert(Value::Null);
        }
        *current = value.into();

        self
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
            .filter(|value| !value.is_null())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl ConfigSource for ValueConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.lookup(key).and_then(scalar_to_string)
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.lookup(key)? {
            Value::Array(items) => Some(items.iter().filter_map(scalar_to_string).collect()),
            Value::String(raw) => Some(split_list(raw)),
            _ => None,
        }
    }

    fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.lookup(key)? {
            Value::Object(entries) => Some(
                entries
                    .iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Process environment lookups.
///
/// `database.authSource` with prefix `CRAWLDB` is read from
/// `CRAWLDB_DATABASE_AUTHSOURCE`. Lists are comma separated; maps are not
/// representable and always resolve to `None`.
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    prefix: String,
}

impl EnvConfigSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Returns the environment variable name backing a dotted key.
    pub fn variable_name(&self, key: &str) -> String {
        let suffix = key.replace('.', "_").to_uppercase();

        if self.prefix.is_empty() {
            suffix
        } else {
            format!("{}_{}", self.prefix.to_uppercase(), suffix)
        }
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new("CRAWLDB")
    }
}

impl ConfigSource for EnvConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.get_string(key).map(|raw| split_list(&raw))
    }

    fn get_string_map(&self, _key: &str) -> Option<BTreeMap<String, String>> {
        None
    }
}

/// An ordered stack of sources; the first source holding a non-empty value wins.
#[derive(Debug, Default)]
pub struct LayeredConfigSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer with lower priority than every layer added before it.
    pub fn with_layer(mut self, layer: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl ConfigSource for LayeredConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.layers
            .iter()
            .find_map(|layer| layer.get_string(key).filter(|v| !v.is_empty()))
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.layers
            .iter()
            .find_map(|layer| layer.get_string_list(key).filter(|v| !v.is_empty()))
    }

    fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.layers
            .iter()
            .find_map(|layer| layer.get_string_map(key).filter(|v| !v.is_empty()))
    }
}

/// Explicit call-site overrides; the highest-priority configuration layer.
///
/// Unset fields fall through to the config source and then to defaults.
#[derive(Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub uri: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub hosts: Option<Vec<String>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: Option<String>,
    pub auth_mechanism: Option<String>,
    pub auth_mechanism_properties: Option<BTreeMap<String, String>>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_auth_source(mut self, auth_source: impl Into<String>) -> Self {
        self.auth_source = Some(auth_source.into());
        self
    }

    pub fn with_auth_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.auth_mechanism = Some(mechanism.into());
        self
    }

    pub fn with_auth_mechanism_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.auth_mechanism_properties = Some(properties);
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("uri", &self.uri.as_ref().map(|_| "<set>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("hosts", &self.hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_source", &self.auth_source)
            .field("auth_mechanism", &self.auth_mechanism)
            .finish_non_exhaustive()
    }
}

/// The fully resolved connection parameters.
///
/// If `uri` is set it determines the target on its own and is handed to the
/// driver verbatim. Otherwise a non-empty `hosts` list wins over `host:port`.
#[derive(Clone, PartialEq)]
pub struct ConnectionDescriptor {
    pub app_name: String,
    pub uri: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: String,
    pub auth_mechanism: Option<String>,
    pub auth_mechanism_properties: BTreeMap<String, String>,
}

/// Where the driver should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// A connection string supplied verbatim.
    Uri(String),
    /// An explicit seed list of `host:port` entries.
    Hosts(Vec<String>),
    /// A connection string synthesized from host, port and database.
    Endpoint(String),
}

/// A discrete credential attached when no URI is used.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub source: String,
    pub mechanism: Option<String>,
    pub mechanism_properties: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .field("mechanism", &self.mechanism)
            .finish_non_exhaustive()
    }
}

impl ConnectionDescriptor {
    /// Returns the connection target according to the uri → hosts → host:port order.
    pub fn target(&self) -> ConnectionTarget {
        if let Some(uri) = &self.uri {
            return ConnectionTarget::Uri(uri.clone());
        }
        if !self.hosts.is_empty() {
            return ConnectionTarget::Hosts(self.hosts.clone());
        }

        ConnectionTarget::Endpoint(format!(
            "mongodb://{}:{}/{}",
            self.host, self.port, self.database
        ))
    }

    /// Returns the discrete credential, if one applies.
    ///
    /// A URI carries its own credentials, and an empty username or password
    /// disables authentication altogether.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.uri.is_some() {
            return None;
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
                source: self.auth_source.clone(),
                mechanism: self.auth_mechanism.clone(),
                mechanism_properties: self.auth_mechanism_properties.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("app_name", &self.app_name)
            .field("uri", &self.uri.as_ref().map(|_| "<set>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("hosts", &self.hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_source", &self.auth_source)
            .field("auth_mechanism", &self.auth_mechanism)
            .finish_non_exhaustive()
    }
}

/// Merges overrides, a config source and defaults into a [`ConnectionDescriptor`].
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ConfigResolver {
    /// Creates a resolver whose default database name is `app_name`.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self { app_name: app_name.into() }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Resolves every field independently: override, then source, then default.
    pub fn resolve(
        &self,
        options: &ConnectOptions,
        source: &dyn ConfigSource,
    ) -> ConnectionDescriptor {
        let string = |explicit: &Option<String>, key: &str| {
            non_empty(explicit.clone()).or_else(|| non_empty(source.get_string(key)))
        };

        let port = options.port.or_else(|| {
            let raw = non_empty(source.get_string(keys::PORT))?;
            match raw.parse::<u16>() {
                Ok(port) => Some(port),
                Err(err) => {
                    warn!(key = keys::PORT, value = %raw, error = %err, "ignoring invalid port");
                    None
                }
            }
        });

        let hosts = options
            .hosts
            .clone()
            .filter(|hosts| !hosts.is_empty())
            .or_else(|| source.get_string_list(keys::HOSTS))
            .unwrap_or_default();

        let auth_mechanism_properties = options
            .auth_mechanism_properties
            .clone()
            .filter(|props| !props.is_empty())
            .or_else(|| source.get_string_map(keys::AUTH_MECHANISM_PROPERTIES))
            .unwrap_or_default();

        ConnectionDescriptor {
            app_name: self.app_name.clone(),
            uri: string(&options.uri, keys::URI),
            host: string(&options.host, keys::HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: port.unwrap_or(DEFAULT_PORT),
            database: string(&options.database, keys::DB).unwrap_or_else(|| self.app_name.clone()),
            hosts,
            username: string(&options.username, keys::USERNAME),
            password: string(&options.password, keys::PASSWORD),
            auth_source: string(&options.auth_source, keys::AUTH_SOURCE)
                .unwrap_or_else(|| DEFAULT_AUTH_SOURCE.to_string()),
            auth_mechanism: string(&options.auth_mechanism, keys::AUTH_MECHANISM),
            auth_mechanism_properties,
        }
    }
}
