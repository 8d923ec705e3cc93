#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! The host integration layer decides which transport a process uses and
//! passes it in explicitly; nothing here probes the environment for notebook
//! globals. [`RuntimeConfig::from_env`] only reads nbwire's own variables:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `NBWIRE_HOST` | `broadcast`/`colab`, `comm`/`jupyter`, `detached`/`none` | `detached` |
//! | `NBWIRE_CAPTURE` | render listener output/faults next to widgets | `true` |
//! | `NBWIRE_MAX_QUEUE` | bound on pre-handshake comm queue (`0` = unbounded) | unbounded |

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

/// Which host messaging substrate the process talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// Push channel per widget plus named kernel callbacks (Colab style).
    Broadcast,
    /// Handshaked duplex connections per widget (Jupyter comm style).
    Comm,
    /// No host; transport operations are no-ops.
    #[default]
    Detached,
}

impl FromStr for HostKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" | "colab" => Ok(Self::Broadcast),
            "comm" | "jupyter" => Ok(Self::Comm),
            "detached" | "none" | "" => Ok(Self::Detached),
            other => Err(RuntimeError::UnknownHost(other.to_owned())),
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Broadcast => "broadcast",
            Self::Comm => "comm",
            Self::Detached => "detached",
        })
    }
}

/// Per-widget behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Capture listener output and faults during view-originated updates and
    /// render them above the widget. When off, faults are only logged.
    pub capture_output: bool,
    /// Strip indentation from generated scripts.
    pub minify_scripts: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            capture_output: true,
            minify_scripts: true,
        }
    }
}

impl WidgetConfig {
    /// Set whether listener output is captured.
    #[must_use]
    pub fn with_capture_output(mut self, enabled: bool) -> Self {
        self.capture_output = enabled;
        self
    }

    /// Set whether scripts are minified.
    #[must_use]
    pub fn with_minify_scripts(mut self, enabled: bool) -> Self {
        self.minify_scripts = enabled;
        self
    }
}

/// Comm transport behavior.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommConfig {
    /// Maximum messages held per widget before the first connection opens.
    /// When full, the oldest message is dropped. `None` is unbounded.
    pub max_queued: Option<usize>,
}

/// Process-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub host: HostKind,
    pub widget: WidgetConfig,
    pub comm: CommConfig,
}

impl RuntimeConfig {
    /// Read configuration from `NBWIRE_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`RuntimeError`] if a variable is present but unparseable.
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// [`RuntimeError`] if a variable is present but unparseable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RuntimeError> {
        let mut config = Self::default();
        if let Some(host) = lookup("NBWIRE_HOST") {
            config.host = host.parse()?;
        }
        if let Some(capture) = lookup("NBWIRE_CAPTURE") {
            config.widget.capture_output = parse_flag("NBWIRE_CAPTURE", &capture)?;
        }
        if let Some(limit) = lookup("NBWIRE_MAX_QUEUE") {
            let n: usize = limit
                .trim()
                .parse()
                .map_err(|_| RuntimeError::InvalidConfig {
                    key: "NBWIRE_MAX_QUEUE",
                    value: limit.clone(),
                })?;
            config.comm.max_queued = (n > 0).then_some(n);
        }
        Ok(config)
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, RuntimeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RuntimeError::InvalidConfig {
            key,
            value: raw.to_owned(),
        }),
    }
}
