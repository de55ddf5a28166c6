use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// The organization id that marks data as public (no organization).
const NO_ORG: i64 = -1;

/// Defines the source of a config error
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Config files carry API keys.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        serde_yaml::to_writer(&mut f, self)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The host the gateway should bind to (network interface).
    pub host: Option<String>,
    /// The port to bind for the HTTP server.
    pub port: Option<String>,
    /// Host and port of the statsd server.
    pub statsd: Option<String>,
    /// The organization that receives copies of public metrics.
    pub public_org_id: Option<String>,
    /// The URL of the downstream publisher.
    pub publish_url: Option<String>,
    /// The URL of the search cluster.
    pub search_url: Option<String>,
}

/// Gateway specific configuration values.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Gateway {
    /// The host the gateway should bind to (network interface).
    host: IpAddr,
    /// The port to bind for the HTTP server.
    port: u16,
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8081,
        }
    }
}

/// Controls various limits
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Limits {
    /// The maximum size of a request body in bytes.
    max_payload_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_payload_size: 10 * 1024 * 1024,
        }
    }
}

/// Http client settings for outgoing requests.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Http {
    /// Timeout for requests to the publisher and search cluster in seconds.
    timeout: u32,
}

impl Default for Http {
    fn default() -> Self {
        Http { timeout: 5 }
    }
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"tsgw"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f32,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "tsgw".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

/// A statically configured API key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// The secret presented by clients.
    pub key: String,
    /// The organization the key belongs to.
    pub org_id: i64,
    /// Whether the key grants admin privileges.
    #[serde(default)]
    pub admin: bool,
}

/// Authentication settings.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct Auth {
    /// A key that authenticates as admin of organization `1`.
    admin_key: Option<String>,
    /// Additional keys.
    keys: Vec<ApiKey>,
}

/// Ingestion policy.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Ingest {
    /// Organization receiving duplicates of public metrics. `-1` disables duplication.
    public_org_id: i64,
}

impl Default for Ingest {
    fn default() -> Self {
        Ingest {
            public_org_id: NO_ORG,
        }
    }
}

/// Downstream publishing.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct Publish {
    /// Endpoint receiving published batches. Batches are discarded when unset.
    url: Option<Url>,
}

/// The search cluster behind `/elasticsearch`.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Search {
    /// Base URL of the cluster. Searches are rejected when unset.
    url: Option<Url>,
    /// Prefix of the daily indices.
    index_name: String,
}

impl Default for Search {
    fn default() -> Self {
        Search {
            url: None,
            index_name: "events".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigValues {
    gateway: Gateway,
    limits: Limits,
    http: Http,
    logging: tsgw_log::LogConfig,
    metrics: Metrics,
    auth: Auth,
    ingest: Ingest,
    publish: Publish,
    search: Search,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A missing `config.yml` yields the default configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = if Self::config_exists(&path) {
            ConfigValues::load(&path)?
        } else {
            ConfigValues::default()
        };

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let gateway = &mut self.values.gateway;

        if let Some(host) = overrides.host {
            gateway.host = host
                .parse::<IpAddr>()
                .map_err(|err| ConfigError::for_field(err, "host"))?;
        }

        if let Some(port) = overrides.port {
            gateway.port = port
                .as_str()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "port"))?;
        }

        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = Some(statsd).filter(|s| !s.is_empty());
        }

        if let Some(public_org_id) = overrides.public_org_id {
            self.values.ingest.public_org_id = public_org_id
                .parse()
                .map_err(|err| ConfigError::for_field(err, "public_org_id"))?;
        }

        if let Some(url) = overrides.publish_url {
            self.values.publish.url = Some(
                url.parse::<Url>()
                    .map_err(|err| ConfigError::for_field(err, "publish_url"))?,
            );
        }

        if let Some(url) = overrides.search_url {
            self.values.search.url = Some(
                url.parse::<Url>()
                    .map_err(|err| ConfigError::for_field(err, "search_url"))?,
            );
        }

        Ok(self)
    }

    /// Checks if the config file exists in the given folder.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current values to `config.yml` in the given folder.
    pub fn save_in_folder<P: AsRef<Path>>(&self, p: P) -> Result<(), ConfigError> {
        let path = p.as_ref();
        if fs::metadata(path).is_err() {
            fs::create_dir_all(path)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;
        }
        self.values.save(path)
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        (self.values.gateway.host, self.values.gateway.port).into()
    }

    /// Returns the maximum size of a request body in bytes.
    pub fn max_payload_size(&self) -> usize {
        self.values.limits.max_payload_size
    }

    /// Returns the timeout for requests to the publisher and search cluster.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout.into())
    }

    /// Returns logging configuration.
    pub fn logging(&self) -> &tsgw_log::LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f32 {
        self.values.metrics.sample_rate
    }

    /// Returns the admin key, if configured.
    pub fn admin_key(&self) -> Option<&str> {
        self.values.auth.admin_key.as_deref()
    }

    /// Returns the statically configured API keys.
    pub fn api_keys(&self) -> &[ApiKey] {
        &self.values.auth.keys
    }

    /// Returns the organization that receives copies of public metrics.
    ///
    /// Returns `None` if duplication is disabled.
    pub fn public_org_id(&self) -> Option<i64> {
        Some(self.values.ingest.public_org_id).filter(|&org| org != NO_ORG)
    }

    /// Returns the endpoint receiving published batches.
    pub fn publish_url(&self) -> Option<&Url> {
        self.values.publish.url.as_ref()
    }

    /// Returns the base URL of the search cluster.
    pub fn search_url(&self) -> Option<&Url> {
        self.values.search.url.as_ref()
    }

    /// Returns the prefix of the daily search indices.
    pub fn search_index_name(&self) -> &str {
        &self.values.search.index_name
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8081".parse().unwrap());
        assert_eq!(config.max_payload_size(), 10 * 1024 * 1024);
        assert_eq!(config.metrics_prefix(), "tsgw");
        assert_eq!(config.public_org_id(), None);
        assert_eq!(config.search_index_name(), "events");
        assert!(config.publish_url().is_none());
    }

    #[test]
    fn test_load_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            r#"
gateway:
  port: 9000
auth:
  admin_key: secret
  keys:
    - key: abc
      org_id: 12
ingest:
  public_org_id: 3
search:
  url: http://localhost:9200/
"#,
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.listen_addr().port(), 9000);
        assert_eq!(config.admin_key(), Some("secret"));
        assert_eq!(
            config.api_keys(),
            &[ApiKey {
                key: "abc".to_owned(),
                org_id: 12,
                admin: false,
            }]
        );
        assert_eq!(config.public_org_id(), Some(3));
        assert_eq!(
            config.search_url().map(Url::as_str),
            Some("http://localhost:9200/")
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.listen_addr().port(), 8081);
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "gateway: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().contains("(file "));
    }

    #[test]
    fn test_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                host: Some("127.0.0.1".to_owned()),
                port: Some("8090".to_owned()),
                public_org_id: Some("7".to_owned()),
                publish_url: Some("http://publisher:6060/metrics".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:8090".parse().unwrap());
        assert_eq!(config.public_org_id(), Some(7));
        assert_eq!(
            config.publish_url().map(Url::as_str),
            Some("http://publisher:6060/metrics")
        );
    }

    #[test]
    fn test_override_invalid_port() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                port: Some("eighty".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field port)");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                statsd: Some("127.0.0.1:8125".to_owned()),
                ..Default::default()
            })
            .unwrap();
        config.save_in_folder(dir.path()).unwrap();

        let reloaded = Config::from_path(dir.path()).unwrap();
        assert_eq!(reloaded.statsd_addr(), Some("127.0.0.1:8125"));
    }

    #[test]
    fn test_yaml_snapshot() {
        let config = Config::from_json_value(serde_json::json!({
            "auth": {"keys": [{"key": "k", "org_id": 2, "admin": true}]}
        }))
        .unwrap();

        insta::assert_snapshot!(config.to_yaml_string().unwrap(), @r###"
        gateway:
          host: 0.0.0.0
          port: 8081
        limits:
          max_payload_size: 10485760
        http:
          timeout: 5
        logging:
          level: info
          format: auto
        metrics:
          statsd: null
          prefix: tsgw
          default_tags: {}
          hostname_tag: null
          sample_rate: 1.0
        auth:
          admin_key: null
          keys:
          - key: k
            org_id: 2
            admin: true
        ingest:
          public_org_id: -1
        publish:
          url: null
        search:
          url: null
          index_name: events
        "###);
    }
}
