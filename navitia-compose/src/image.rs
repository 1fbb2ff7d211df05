use log::{debug, info};
use serde_json::Value;
use std::{
    fmt, fs,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    config::Settings,
    error::{Error, Result},
    models::{ContainerId, ContainerName, ContainerSpec},
    options::{normalize, ImageOptions, NormalizedOptions},
    services::{ContainerEngine, RemoteSettings, RemoteShell},
};

pub const DEFAULT_INSPECT_FIELD: &str = "NetworkSettings.IPAddress";

/// Prefix of the build transcript lines reporting a failure.
///
/// This is the only failure signal of a streamed build: a failing build
/// that does not emit such a line goes unnoticed.
pub const BUILD_ERROR_MARKER: &str = "{\"errorDetail";

/// An image built from a local context and its container, if any.
#[derive(Clone, Debug)]
pub struct Image {
    image_name: String,
    container_name: ContainerName,
    short_container_name: String,
    path: PathBuf,
    options: NormalizedOptions,
    key_file: PathBuf,
    remote_user: String,
    verbose: bool,
    container: Option<ContainerId>,
    output: Option<String>,
}

impl Image {
    /// An image of a composed platform, built from `<docker_root>/<distrib>/<name>`.
    pub fn composed(
        name: &str,
        distrib: &str,
        platform: &str,
        options: &ImageOptions,
        settings: &Settings,
    ) -> Result<Image> {
        let naming = &settings.naming;
        let image_name = format!("{}{}_{}", naming.image_prefix, distrib, name);
        let container_name = format!("{}{}_{}", naming.container_prefix, platform, name);
        let path = settings.docker_root.join(distrib).join(name);

        Image::new(
            image_name,
            ContainerName(container_name),
            platform.to_owned(),
            &path,
            options,
            settings,
        )
    }

    pub fn new(
        image_name: String,
        container_name: ContainerName,
        short_container_name: String,
        path: &Path,
        options: &ImageOptions,
        settings: &Settings,
    ) -> Result<Image> {
        let mut image = Image {
            image_name,
            container_name,
            short_container_name,
            path: PathBuf::new(),
            options: NormalizedOptions::default(),
            key_file: settings.key_file.clone(),
            remote_user: settings.remote_user.clone(),
            verbose: settings.verbose,
            container: None,
            output: None,
        };
        image.set_path(path)?;
        image.options = normalize(options)?;

        Ok(image)
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn container_name(&self) -> &ContainerName {
        &self.container_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &NormalizedOptions {
        &self.options
    }

    pub fn container(&self) -> Option<&ContainerId> {
        self.container.as_ref()
    }

    pub(crate) fn set_container(&mut self, container: Option<ContainerId>) {
        self.container = container;
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Points the image at a build context and drops the public key in it.
    pub fn set_path(&mut self, path: &Path) -> Result<()> {
        let readable = path.is_dir() && File::open(path.join("Dockerfile")).is_ok();
        if !readable {
            return Err(Error::Configuration { path: path.into() });
        }

        if let Some(file_name) = self.key_file.file_name() {
            fs::copy(&self.key_file, path.join(file_name))?;
        }
        self.path = path.into();

        Ok(())
    }

    pub fn build(&self, engine: &mut dyn ContainerEngine) -> Result<()> {
        info!(
            "building {} from {}/Dockerfile",
            self.image_name,
            self.path.display()
        );
        let transcript = engine.build_image(&self.path, &self.image_name)?;

        scan_build_output(&self.image_name, &transcript, self.verbose)
    }

    pub fn destroy(&self, engine: &mut dyn ContainerEngine) -> Result<()> {
        info!("removing image {:?}", self.image_name);
        engine.remove_image(&self.image_name)
    }

    pub fn create(&mut self, engine: &mut dyn ContainerEngine) -> Result<()> {
        let mut spec = ContainerSpec {
            image_name: self.image_name.clone(),
            container_name: self.container_name.clone(),
            host_config: None,
            ports: Vec::new(),
            volumes: Vec::new(),
        };
        if !self.options.is_empty() {
            spec.host_config = Some(self.options.host_config.clone());
            spec.ports = self.options.ports.clone();
            spec.volumes = self.options.volumes.clone();
        }

        let id = engine.create_container(spec)?;
        info!("created container {} ({})", self.container_name.0, id.short());
        self.container = Some(id);

        Ok(())
    }

    pub fn start(&self, engine: &mut dyn ContainerEngine) -> Result<()> {
        engine.start_container(self.require_container()?)
    }

    pub fn stop(&self, engine: &mut dyn ContainerEngine) -> Result<()> {
        engine.stop_container(self.require_container()?)
    }

    pub fn remove(&mut self, engine: &mut dyn ContainerEngine) -> Result<()> {
        engine.remove_container(self.require_container()?)?;
        self.container = None;

        Ok(())
    }

    /// Commits the container, by default to `<image_name>_<short_container_name>`.
    pub fn commit(&self, engine: &mut dyn ContainerEngine, repo: Option<&str>) -> Result<()> {
        let repo = match repo {
            Some(repo) => repo.to_owned(),
            None => format!("{}_{}", self.image_name, self.short_container_name),
        };
        info!("committing {} to {}", self.container_name.0, repo);

        engine.commit_container(&self.container_name, &repo)
    }

    /// Looks up a dot separated field of the container configuration.
    ///
    /// `None` means the field is not available (yet).
    pub fn inspect(&self, engine: &mut dyn ContainerEngine, field: &str) -> Result<Option<Value>> {
        let config = engine.inspect_container(self.require_container()?)?;

        Ok(lookup_field(&config, field).cloned())
    }

    /// `<remote_user>@<address>` of the running container.
    pub fn get_host(&self, engine: &mut dyn ContainerEngine) -> Result<String> {
        let address = self.inspect(engine, DEFAULT_INSPECT_FIELD)?;

        match address {
            Some(Value::String(address)) if !address.is_empty() => {
                Ok(format!("{}@{}", self.remote_user, address))
            }
            _ => Err(Error::NoAddress {
                container: self.container_name.0.clone(),
            }),
        }
    }

    pub fn run(
        &mut self,
        engine: &mut dyn ContainerEngine,
        shell: &mut dyn RemoteShell,
        cmd: &str,
        sudo: bool,
    ) -> Result<()> {
        let settings = RemoteSettings::new(self.get_host(engine)?).hide_stdout(!self.verbose);
        debug!("running {:?} on {}", cmd, settings.host_string);

        let output = if sudo {
            shell.sudo(&settings, cmd)?
        } else {
            shell.run(&settings, cmd)?
        };
        self.output = Some(output);

        Ok(())
    }

    pub fn put(
        &self,
        engine: &mut dyn ContainerEngine,
        shell: &mut dyn RemoteShell,
        source: &Path,
        dest: &str,
        sudo: bool,
    ) -> Result<()> {
        let settings = RemoteSettings::new(self.get_host(engine)?);

        shell.put(&settings, source, dest, sudo)
    }

    fn require_container(&self) -> Result<&ContainerId> {
        self.container.as_ref().ok_or_else(|| Error::NoContainer {
            container: self.container_name.0.clone(),
        })
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{} (container {})", self.image_name, container.short()),
            None => write!(f, "{} (no container)", self.image_name),
        }
    }
}

/// Fails on the first line of a build transcript that reports an error.
pub fn scan_build_output(image_name: &str, transcript: &[String], verbose: bool) -> Result<()> {
    for line in transcript {
        if verbose {
            print!("{}", line);
        }
        if line.starts_with(BUILD_ERROR_MARKER) {
            return Err(Error::Build {
                image: image_name.into(),
                line: line.trim_end().into(),
            });
        }
    }

    Ok(())
}

/// Walks a dot separated path into a JSON document. Empty segments are
/// skipped, so an empty path yields the whole document.
pub fn lookup_field<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |value, segment| value.get(segment))
}
