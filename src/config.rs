//! Harness tunables
//!
//! Every knob has a default; command-line options and YAML config files
//! only override them. Anything malformed is a [`ConfigError`] and is
//! reported before a single worker starts.
//!
//! The server's config file uses the same nesting as a Spring
//! `application.yml`:
//!
//! ```yaml
//! ctf-server:
//!   port: 9991
//!   goaway-interval-ms: 60000
//!   backlog: 128
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default fault injector port
pub const DEFAULT_SERVER_PORT: u16 = 9991;

/// Default delay between GOAWAY frames on one connection
pub const DEFAULT_GOAWAY_INTERVAL: Duration = Duration::from_secs(60);

/// Pending-connection queue length for the injector socket
pub const DEFAULT_BACKLOG: u32 = 128;

/// How long the accept loop waits for a connection before rechecking shutdown
pub const DEFAULT_ACCEPT_POLL: Duration = Duration::from_millis(250);

/// Default connectivity poll rate
pub const DEFAULT_RECONNECT_RATE: Duration = Duration::from_millis(250);

pub const DEFAULT_NUM_ITERATIONS: u32 = 1;
pub const DEFAULT_NUM_THREADS: usize = 10;
pub const DEFAULT_ITERATION_DELAY: Duration = Duration::ZERO;

/// Delay between state queries in stress mode
pub const DEFAULT_STRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing value for option: {0}")]
    MissingValue(String),

    #[error("Invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fault injector settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Sleep between GOAWAY frames
    pub goaway_interval: Duration,
    /// Connections the kernel queues before `accept`
    pub backlog: u32,
    /// Accept-loop poll timeout, bounding how long shutdown goes unnoticed there
    pub accept_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_SERVER_PORT,
            goaway_interval: DEFAULT_GOAWAY_INTERVAL,
            backlog: DEFAULT_BACKLOG,
            accept_poll: DEFAULT_ACCEPT_POLL,
        }
    }
}

/// Layout of the server config file. Top-level sections other than
/// `ctf-server` are ignored so one file can serve several tools.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    #[serde(default)]
    ctf_server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ServerSection {
    port: Option<u16>,
    goaway_interval_ms: Option<u64>,
    backlog: Option<u32>,
}

impl ServerConfig {
    /// Overlay the `ctf-server` section of a YAML document
    pub fn apply_yaml(&mut self, text: &str) -> Result<(), ConfigError> {
        let file: Option<ConfigFile> = serde_yaml::from_str(text)?;
        let section = file.unwrap_or_default().ctf_server;

        if let Some(port) = section.port {
            self.port = port;
        }
        if let Some(ms) = section.goaway_interval_ms {
            self.goaway_interval = nonzero_millis("ctf-server.goaway-interval-ms", ms)?;
        }
        if let Some(backlog) = section.backlog {
            self.backlog = nonzero("ctf-server.backlog", backlog)?;
        }
        Ok(())
    }

    /// Load defaults overlaid with a YAML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = ServerConfig::default();
        config.apply_yaml(&text)?;
        Ok(config)
    }

    /// Reject settings that would turn a periodic loop into a spin
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero_duration("goaway-interval", self.goaway_interval)?;
        nonzero_duration("accept-poll", self.accept_poll)?;
        nonzero("backlog", self.backlog)?;
        Ok(())
    }
}

/// Parsed `goaway-server` command line
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub config: ServerConfig,
    pub log_level: tracing::Level,
    pub help: bool,
}

impl ServerCommand {
    /// Parse arguments (without the program name).
    ///
    /// `-c/--config` is loaded first; `-p/--port`, `-i/--goaway-interval-ms`
    /// and `-b/--backlog` override whatever the file set.
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut config_path = None;
        let mut port = None;
        let mut interval = None;
        let mut backlog = None;
        let mut log_level = tracing::Level::INFO;
        let mut help = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => help = true,
                "-c" | "--config" => config_path = Some(required(&arg, args.next())?),
                "-p" | "--port" => port = Some(parse_value(&arg, &required(&arg, args.next())?)?),
                "-i" | "--goaway-interval-ms" => {
                    let value = required(&arg, args.next())?;
                    interval = Some(nonzero_millis(&arg, parse_value(&arg, &value)?)?)
                }
                "-b" | "--backlog" => {
                    let value = required(&arg, args.next())?;
                    backlog = Some(nonzero(&arg, parse_value::<u32>(&arg, &value)?)?)
                }
                "--log-level" => log_level = parse_value(&arg, &required(&arg, args.next())?)?,
                _ => return Err(ConfigError::UnknownOption(arg)),
            }
        }

        let mut config = match config_path {
            Some(path) => ServerConfig::from_file(Path::new(&path))?,
            None => ServerConfig::default(),
        };
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(interval) = interval {
            config.goaway_interval = interval;
        }
        if let Some(backlog) = backlog {
            config.backlog = backlog;
        }

        Ok(ServerCommand { config, log_level, help })
    }
}

/// Connectivity watcher settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Fixed poll rate
    pub rate: Duration,
    /// Give up after this many ticks; `None` polls until READY
    pub max_attempts: Option<u32>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            rate: DEFAULT_RECONNECT_RATE,
            max_attempts: None,
        }
    }
}

impl WatcherConfig {
    pub fn rate(mut self, rate: Duration) -> Self {
        self.rate = rate;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// A zero rate would poll the channel nonstop
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero_duration("reconnect-rate", self.rate).map(|_| ())
    }
}

/// Stress-mode settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    pub workers: usize,
    pub iterations: u32,
    pub interval: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            workers: DEFAULT_NUM_THREADS,
            iterations: DEFAULT_NUM_ITERATIONS,
            interval: DEFAULT_STRESS_INTERVAL,
        }
    }
}

/// What the client harness does once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestOperation {
    #[default]
    NormalClientExecution,
    SpamChannelGetState,
}

impl fmt::Display for TestOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOperation::NormalClientExecution => write!(f, "normal-client-execution"),
            TestOperation::SpamChannelGetState => write!(f, "spam-channel-get-state"),
        }
    }
}

/// Client harness options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub num_iterations: u32,
    pub iteration_delay: Duration,
    pub num_threads: usize,
    pub execute_async: bool,
    pub operation: TestOperation,
    pub watcher: WatcherConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            num_iterations: DEFAULT_NUM_ITERATIONS,
            iteration_delay: DEFAULT_ITERATION_DELAY,
            num_threads: DEFAULT_NUM_THREADS,
            execute_async: false,
            operation: TestOperation::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl ClientOptions {
    /// Parse client arguments (without the program name).
    ///
    /// `-a/--async` and `-s/--sync` may both appear; the last one wins.
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = ClientOptions::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-n" | "--num-iteration" => {
                    options.num_iterations = parse_value(&arg, &required(&arg, args.next())?)?
                }
                "-d" | "--iteration-delay" => {
                    options.iteration_delay = parse_millis(&arg, &required(&arg, args.next())?)?
                }
                "-t" | "--num-thread" => {
                    let value = required(&arg, args.next())?;
                    options.num_threads = parse_value(&arg, &value)?;
                    if options.num_threads == 0 {
                        return Err(ConfigError::InvalidValue { option: arg, value });
                    }
                }
                "-a" | "--async" => options.execute_async = true,
                "-s" | "--sync" => options.execute_async = false,
                "-x" | "--spam-channel-get-state" => {
                    options.operation = TestOperation::SpamChannelGetState
                }
                "-r" | "--reconnect-rate-ms" => {
                    let value = required(&arg, args.next())?;
                    options.watcher.rate = nonzero_millis(&arg, parse_value(&arg, &value)?)?;
                }
                "-m" | "--max-reconnect-attempts" => {
                    options.watcher.max_attempts = Some(parse_value(&arg, &required(&arg, args.next())?)?)
                }
                _ => return Err(ConfigError::UnknownOption(arg)),
            }
        }

        Ok(options)
    }

    /// Stress-mode settings derived from these options
    pub fn stress_config(&self) -> StressConfig {
        StressConfig {
            workers: self.num_threads,
            iterations: self.num_iterations,
            interval: DEFAULT_STRESS_INTERVAL,
        }
    }
}

fn required(option: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingValue(option.to_string()))
}

fn parse_value<T: FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn parse_millis(option: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_value::<u64>(option, value).map(Duration::from_millis)
}

fn nonzero(option: &str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn nonzero_millis(option: &str, ms: u64) -> Result<Duration, ConfigError> {
    nonzero_duration(option, Duration::from_millis(ms))
}

fn nonzero_duration(option: &str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: format!("{:?}", value),
        });
    }
    Ok(value)
}
