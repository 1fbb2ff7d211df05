use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid path or missing Dockerfile in {path:?}")]
    Configuration { path: PathBuf },

    #[error("build of {image} failed @ {line}")]
    Build { image: String, line: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("unknown deployment command {0:?}")]
    UnknownCommand(String),

    #[error("unknown platform {0:?}")]
    UnknownPlatform(String),

    #[error("platform {platform:?} expects {expected}")]
    PlatformHosts {
        platform: String,
        expected: &'static str,
    },

    #[error("no image named {0:?} in this platform")]
    UnknownImage(String),

    /// `host_ip:host_port:guest_port` port specs.
    #[error("port spec {0:?} is not supported, use host_port:guest_port")]
    UnsupportedPortSpec(String),

    #[error("invalid option {spec:?}: {reason}")]
    InvalidOption { spec: String, reason: String },

    #[error("container {container} has not been created")]
    NoContainer { container: String },

    #[error("container {container} has no network address, is it running?")]
    NoAddress { container: String },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("command {command:?} failed on {host} ({status})")]
    Remote {
        host: String,
        command: String,
        status: String,
    },

    #[error("command {command:?} failed ({status})")]
    Command { command: String, status: String },

    #[error(transparent)]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
