use std::path::Path;

use crate::{
    error::Result,
    models::{ContainerId, ContainerName, ContainerSpec, ContainerSummary, ImageSummary},
};

/// The subset of the container engine API the deployment layer relies on.
pub trait ContainerEngine {
    fn list_images(&mut self) -> Result<Vec<ImageSummary>>;

    fn list_containers(&mut self, include_stopped: bool) -> Result<Vec<ContainerSummary>>;

    /// Builds `tag` from the context directory and returns the raw build
    /// transcript, one JSON document per line.
    fn build_image(&mut self, context: &Path, tag: &str) -> Result<Vec<String>>;

    /// Fails with `Error::NotFound` when the image does not exist.
    fn remove_image(&mut self, tag: &str) -> Result<()>;

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId>;

    fn start_container(&mut self, id: &ContainerId) -> Result<()>;

    fn stop_container(&mut self, id: &ContainerId) -> Result<()>;

    fn remove_container(&mut self, id: &ContainerId) -> Result<()>;

    fn commit_container(&mut self, container: &ContainerName, repo: &str) -> Result<()>;

    fn inspect_container(&mut self, id: &ContainerId) -> Result<serde_json::Value>;
}

/// Per call settings of the remote execution layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSettings {
    /// `user@address` to connect to.
    pub host_string: String,
    pub hide_stdout: bool,
}

impl RemoteSettings {
    pub fn new<S: Into<String>>(host_string: S) -> RemoteSettings {
        RemoteSettings {
            host_string: host_string.into(),
            hide_stdout: false,
        }
    }

    pub fn hide_stdout(mut self, hide: bool) -> RemoteSettings {
        self.hide_stdout = hide;
        self
    }
}

pub trait RemoteShell {
    fn run(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String>;

    fn sudo(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String>;

    fn put(
        &mut self,
        settings: &RemoteSettings,
        source: &Path,
        dest: &str,
        use_sudo: bool,
    ) -> Result<()>;
}

/// Runs a command line on the local machine.
pub trait CommandRunner {
    fn run(&mut self, command_line: &str) -> Result<()>;
}

/// The collaborators a platform drives.
pub struct Backends {
    pub engine: Box<dyn ContainerEngine>,
    pub shell: Box<dyn RemoteShell>,
    pub runner: Box<dyn CommandRunner>,
}
