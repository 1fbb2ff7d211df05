//! In-memory collaborators for the unit tests.

use serde_json::{json, Value};
use std::{
    cell::RefCell,
    rc::Rc,
    collections::BTreeSet as Set,
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
};
use tempfile::TempDir;

use crate::{
    config::Settings,
    error::{Error, Result},
    models::{ContainerId, ContainerName, ContainerSpec, ContainerSummary, ImageId, ImageSummary},
    services::{Backends, CommandRunner, ContainerEngine, RemoteSettings, RemoteShell},
};

static CWD: Mutex<()> = Mutex::new(());

/// Serializes the tests that switch the process working directory.
pub fn cwd_lock() -> MutexGuard<'static, ()> {
    CWD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A project root with a key file, and settings pointing at it.
pub fn project() -> (TempDir, Settings) {
    let root = TempDir::new().unwrap();
    let settings = Settings::new(root.path());
    fs::create_dir_all(settings.key_file.parent().unwrap()).unwrap();
    fs::write(&settings.key_file, "ssh-rsa AAAA test\n").unwrap();
    fs::create_dir_all(&settings.templates_dir).unwrap();

    (root, settings)
}

/// Creates `<docker_root>/<parts..>/Dockerfile`.
pub fn build_context(settings: &Settings, parts: &[&str]) {
    let path = parts
        .iter()
        .fold(settings.docker_root.clone(), |path, part| path.join(part));
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("Dockerfile"), "FROM debian:8\n").unwrap();
}

pub fn write_template(settings: &Settings, name: &str, content: &str) {
    fs::write(
        settings.templates_dir.join(format!("{}.yml.tera", name)),
        content,
    )
    .unwrap();
}

#[derive(Default)]
pub struct FakeEngine {
    pub images: Vec<ImageSummary>,
    pub containers: Vec<ContainerSummary>,
    pub build_transcript: Vec<String>,
    pub missing_images: Set<String>,
    pub address: String,
    pub built: Vec<String>,
    pub removed_images: Vec<String>,
    pub created: Vec<ContainerSpec>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub removed_containers: Vec<String>,
    pub commits: Vec<(String, String)>,
}

impl FakeEngine {
    pub fn add_image(&mut self, id: &str, tag: &str) {
        self.images.push(ImageSummary {
            id: ImageId(id.into()),
            repo_tags: vec![tag.into()],
        });
    }

    pub fn add_container(&mut self, id: &str, name: &str, image: &str) {
        self.containers.push(ContainerSummary {
            id: ContainerId(id.into()),
            names: vec![format!("/{}", name)],
            image: image.into(),
        });
    }
}

impl ContainerEngine for FakeEngine {
    fn list_images(&mut self) -> Result<Vec<ImageSummary>> {
        Ok(self.images.clone())
    }

    fn list_containers(&mut self, _include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        Ok(self.containers.clone())
    }

    fn build_image(&mut self, _context: &Path, tag: &str) -> Result<Vec<String>> {
        self.built.push(tag.into());
        Ok(self.build_transcript.clone())
    }

    fn remove_image(&mut self, tag: &str) -> Result<()> {
        self.removed_images.push(tag.into());
        if self.missing_images.contains(tag) {
            return Err(Error::NotFound {
                what: format!("image {}", tag),
            });
        }
        Ok(())
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        let id = ContainerId(format!("container-{}", self.created.len() + 1));
        self.add_container(&id.0, &spec.container_name.0, &spec.image_name);
        self.created.push(spec);
        Ok(id)
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        self.started.push(id.0.clone());
        Ok(())
    }

    fn stop_container(&mut self, id: &ContainerId) -> Result<()> {
        self.stopped.push(id.0.clone());
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.removed_containers.push(id.0.clone());
        self.containers.retain(|container| container.id != *id);
        Ok(())
    }

    fn commit_container(&mut self, container: &ContainerName, repo: &str) -> Result<()> {
        self.commits.push((container.0.clone(), repo.into()));
        Ok(())
    }

    fn inspect_container(&mut self, id: &ContainerId) -> Result<Value> {
        Ok(json!({
            "Id": id.0,
            "NetworkSettings": { "IPAddress": self.address },
        }))
    }
}

#[derive(Default)]
pub struct FakeShell {
    pub calls: Vec<(RemoteSettings, String)>,
    pub puts: Vec<(String, String)>,
    /// Host strings on which every command fails.
    pub failing_hosts: Set<String>,
}

impl FakeShell {
    fn call(&mut self, settings: &RemoteSettings, cmd: String) -> Result<String> {
        self.calls.push((settings.clone(), cmd.clone()));
        if self.failing_hosts.contains(&settings.host_string) {
            return Err(Error::Remote {
                host: settings.host_string.clone(),
                command: cmd,
                status: "exit status: 1".into(),
            });
        }
        Ok(cmd)
    }
}

impl RemoteShell for FakeShell {
    fn run(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.call(settings, cmd.into())
    }

    fn sudo(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.call(settings, format!("sudo {}", cmd))
    }

    fn put(
        &mut self,
        settings: &RemoteSettings,
        _source: &Path,
        dest: &str,
        _use_sudo: bool,
    ) -> Result<()> {
        self.puts.push((settings.host_string.clone(), dest.into()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRunner {
    pub commands: Vec<(String, std::path::PathBuf)>,
    pub fail: bool,
}

impl CommandRunner for FakeRunner {
    fn run(&mut self, command_line: &str) -> Result<()> {
        let cwd = std::env::current_dir()?;
        self.commands.push((command_line.into(), cwd));
        if self.fail {
            return Err(Error::Command {
                command: command_line.into(),
                status: "exit status: 1".into(),
            });
        }
        Ok(())
    }
}

pub type Shared<T> = Rc<RefCell<T>>;

/// Fakes shared between a platform and the test inspecting them.
pub fn backends() -> (Backends, Shared<FakeEngine>, Shared<FakeShell>, Shared<FakeRunner>) {
    let engine = Rc::new(RefCell::new(FakeEngine::default()));
    let shell = Rc::new(RefCell::new(FakeShell::default()));
    let runner = Rc::new(RefCell::new(FakeRunner::default()));
    let backends = Backends {
        engine: Box::new(engine.clone()),
        shell: Box::new(shell.clone()),
        runner: Box::new(runner.clone()),
    };

    (backends, engine, shell, runner)
}

impl<T: ContainerEngine> ContainerEngine for Shared<T> {
    fn list_images(&mut self) -> Result<Vec<ImageSummary>> {
        self.borrow_mut().list_images()
    }

    fn list_containers(&mut self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        self.borrow_mut().list_containers(include_stopped)
    }

    fn build_image(&mut self, context: &Path, tag: &str) -> Result<Vec<String>> {
        self.borrow_mut().build_image(context, tag)
    }

    fn remove_image(&mut self, tag: &str) -> Result<()> {
        self.borrow_mut().remove_image(tag)
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        self.borrow_mut().create_container(spec)
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        self.borrow_mut().start_container(id)
    }

    fn stop_container(&mut self, id: &ContainerId) -> Result<()> {
        self.borrow_mut().stop_container(id)
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.borrow_mut().remove_container(id)
    }

    fn commit_container(&mut self, container: &ContainerName, repo: &str) -> Result<()> {
        self.borrow_mut().commit_container(container, repo)
    }

    fn inspect_container(&mut self, id: &ContainerId) -> Result<Value> {
        self.borrow_mut().inspect_container(id)
    }
}

impl<T: RemoteShell> RemoteShell for Shared<T> {
    fn run(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.borrow_mut().run(settings, cmd)
    }

    fn sudo(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.borrow_mut().sudo(settings, cmd)
    }

    fn put(
        &mut self,
        settings: &RemoteSettings,
        source: &Path,
        dest: &str,
        use_sudo: bool,
    ) -> Result<()> {
        self.borrow_mut().put(settings, source, dest, use_sudo)
    }
}

impl<T: CommandRunner> CommandRunner for Shared<T> {
    fn run(&mut self, command_line: &str) -> Result<()> {
        self.borrow_mut().run(command_line)
    }
}
