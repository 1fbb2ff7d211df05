use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    errors::Error as DockerError,
    image::{BuildImageOptions, CommitContainerOptions, ListImagesOptions, RemoveImageOptions},
    models::{BuildInfo, HostConfig as DockerHostConfig, PortBinding},
    Docker, API_DEFAULT_VERSION,
};
use futures::{Stream, StreamExt};
use ignore::WalkBuilder;
use log::{debug, info};
use number_prefix::NumberPrefix;
use serde_json::{json, Map as JsonMap, Value};
use std::{
    collections::HashMap,
    future::Future,
    io::{Read, Seek, SeekFrom},
    path::Path,
};
use tar::Builder as TarBuilder;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::{
    error::{Error, Result},
    models::{
        ContainerId, ContainerName, ContainerSpec, ContainerSummary, HostConfig, ImageId,
        ImageSummary,
    },
    services::ContainerEngine,
};

const CONNECT_TIMEOUT: u64 = 120;
const STOP_TIMEOUT: i64 = 10;

/// Talks to a Docker daemon, blocking on every call.
pub struct DockerBackend {
    client: Docker,
    runtime: Runtime,
}

impl DockerBackend {
    /// Connects to `host` (`unix://`, `tcp://` or `http://`), or to the
    /// local defaults.
    pub fn connect(host: Option<&str>) -> Result<DockerBackend> {
        let client = match host {
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, CONNECT_TIMEOUT, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(
                &host.replacen("tcp://", "http://", 1),
                CONNECT_TIMEOUT,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(engine_error)?;

        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;

        Ok(DockerBackend { client, runtime })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl ContainerEngine for DockerBackend {
    fn list_images(&mut self) -> Result<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        let images = self
            .block_on(self.client.list_images(Some(options)))
            .map_err(engine_error)?;

        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: ImageId(image.id),
                repo_tags: image.repo_tags,
            })
            .collect())
    }

    fn list_containers(&mut self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let containers = self
            .block_on(self.client.list_containers(Some(options)))
            .map_err(engine_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                Some(ContainerSummary {
                    id: ContainerId(container.id?),
                    names: container.names.unwrap_or_default(),
                    image: container.image.unwrap_or_default(),
                })
            })
            .collect())
    }

    fn build_image(&mut self, context: &Path, tag: &str) -> Result<Vec<String>> {
        let archive = archive_context(context)?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_owned(),
            t: tag.to_owned(),
            rm: true,
            ..Default::default()
        };

        let stream = self
            .client
            .build_image(options, None, Some(archive.into()));

        self.block_on(collect_transcript(stream))
    }

    fn remove_image(&mut self, tag: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.block_on(self.client.remove_image(tag, Some(options), None))
            .map_err(|err| not_found(err, format!("image {}", tag)))?;

        Ok(())
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        let options = CreateContainerOptions {
            name: spec.container_name.0.clone(),
            platform: None,
        };

        let mut config = Config::<String> {
            image: Some(spec.image_name.clone()),
            ..Default::default()
        };
        if let Some(host_config) = &spec.host_config {
            config.host_config = Some(docker_host_config(host_config));

            let exposed = spec
                .ports
                .iter()
                .chain(host_config.port_bindings.keys())
                .map(|port| (format!("{}/tcp", port), HashMap::new()))
                .collect::<HashMap<_, _>>();
            if !exposed.is_empty() {
                config.exposed_ports = Some(exposed);
            }
        }
        if !spec.volumes.is_empty() {
            config.volumes = Some(
                spec.volumes
                    .iter()
                    .map(|volume| (volume.clone(), HashMap::new()))
                    .collect(),
            );
        }

        let response = self
            .block_on(self.client.create_container(Some(options), config))
            .map_err(|err| not_found(err, format!("image {}", spec.image_name)))?;

        Ok(ContainerId(response.id))
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        self.block_on(
            self.client
                .start_container(&id.0, None::<StartContainerOptions<String>>),
        )
        .map_err(|err| not_found(err, format!("container {}", id)))
    }

    fn stop_container(&mut self, id: &ContainerId) -> Result<()> {
        let options = StopContainerOptions { t: STOP_TIMEOUT };
        self.block_on(self.client.stop_container(&id.0, Some(options)))
            .map_err(|err| not_found(err, format!("container {}", id)))
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.block_on(
            self.client
                .remove_container(&id.0, None::<RemoveContainerOptions>),
        )
        .map_err(|err| not_found(err, format!("container {}", id)))
    }

    fn commit_container(&mut self, container: &ContainerName, repo: &str) -> Result<()> {
        let options = CommitContainerOptions {
            container: container.0.clone(),
            repo: repo.to_owned(),
            ..Default::default()
        };
        self.block_on(
            self.client
                .commit_container(options, Config::<String>::default()),
        )
        .map_err(|err| not_found(err, format!("container {}", container.0)))?;
        info!("committed {} as {}", container.0, repo);

        Ok(())
    }

    fn inspect_container(&mut self, id: &ContainerId) -> Result<serde_json::Value> {
        let response = self
            .block_on(
                self.client
                    .inspect_container(&id.0, None::<InspectContainerOptions>),
            )
            .map_err(|err| not_found(err, format!("container {}", id)))?;

        serde_json::to_value(response).map_err(|err| Error::Engine(err.to_string()))
    }
}

/// Tars the build context, honoring `.dockerignore`.
fn archive_context(context: &Path) -> Result<Vec<u8>> {
    let mut tar = TarBuilder::new(tempfile::tempfile()?);
    let walk = WalkBuilder::new(context)
        .add_custom_ignore_filename(".dockerignore")
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .hidden(false)
        .build();

    let mut context_size = 0;
    for result in walk {
        let entry = result.map_err(|err| Error::Engine(err.to_string()))?;
        let relative = match entry.path().strip_prefix(context) {
            Ok(relative) if relative.as_os_str().is_empty() => continue,
            Ok(relative) => relative.to_owned(),
            Err(_) => continue,
        };
        tar.append_path_with_name(entry.path(), &relative)?;
        context_size += entry
            .metadata()
            .map_err(|err| Error::Engine(err.to_string()))?
            .len();
    }

    match NumberPrefix::binary(context_size as f32) {
        NumberPrefix::Standalone(bytes) => info!("archived build context ({} bytes)", bytes),
        NumberPrefix::Prefixed(prefix, n) => {
            info!("archived build context ({:.1} {}B)", n, prefix)
        }
    };

    let mut file = tar.into_inner()?;
    file.seek(SeekFrom::Start(0))?;
    let mut archive = Vec::new();
    file.read_to_end(&mut archive)?;

    Ok(archive)
}

/// Collects the build messages, stopping after the first error.
///
/// The client reports daemon errors as `DockerStreamError`; they are written
/// back as `errorDetail` lines so the transcript scan sees them.
async fn collect_transcript<S>(stream: S) -> Result<Vec<String>>
where
    S: Stream<Item = std::result::Result<BuildInfo, DockerError>>,
{
    futures::pin_mut!(stream);

    let mut transcript = Vec::new();
    while let Some(item) = stream.next().await {
        let (line, failed) = match item {
            Ok(info) => (transcript_line(&info), info.error_detail.is_some()),
            Err(DockerError::DockerStreamError { error }) => (error_line(&error), true),
            Err(err) => return Err(engine_error(err)),
        };
        debug!("{}", line.trim_end());
        transcript.push(line);
        if failed {
            break;
        }
    }

    Ok(transcript)
}

/// Writes a build message back the way the daemon streams it.
fn transcript_line(info: &BuildInfo) -> String {
    if let Some(detail) = &info.error_detail {
        let message = detail
            .message
            .as_deref()
            .or_else(|| info.error.as_deref())
            .unwrap_or_default();
        return error_line(message);
    }

    let mut line = JsonMap::new();
    if let Some(stream) = &info.stream {
        line.insert("stream".into(), Value::String(stream.clone()));
    }
    if let Some(status) = &info.status {
        line.insert("status".into(), Value::String(status.clone()));
    }
    if let Some(id) = &info.id {
        line.insert("id".into(), Value::String(id.clone()));
    }

    format!("{}\n", Value::Object(line))
}

/// `errorDetail` comes first, as in the daemon output.
fn error_line(message: &str) -> String {
    format!(
        "{{\"errorDetail\":{},\"error\":{}}}\n",
        json!({ "message": message }),
        Value::String(message.to_owned())
    )
}

fn docker_host_config(host_config: &HostConfig) -> DockerHostConfig {
    let binds = host_config
        .binds
        .iter()
        .map(|(host, bind)| {
            let mode = if bind.ro { "ro" } else { "rw" };
            format!("{}:{}:{}", host, bind.bind, mode)
        })
        .collect::<Vec<_>>();

    let port_bindings = host_config
        .port_bindings
        .iter()
        .map(|(guest, host)| {
            let binding = PortBinding {
                host_ip: None,
                host_port: host.map(|port| port.to_string()),
            };
            (format!("{}/tcp", guest), Some(vec![binding]))
        })
        .collect::<HashMap<_, _>>();

    DockerHostConfig {
        binds: if binds.is_empty() { None } else { Some(binds) },
        port_bindings: if port_bindings.is_empty() {
            None
        } else {
            Some(port_bindings)
        },
        ..Default::default()
    }
}

fn engine_error(err: DockerError) -> Error {
    Error::Engine(err.to_string())
}

fn not_found(err: DockerError, what: String) -> Error {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::NotFound { what },
        err => engine_error(err),
    }
}
