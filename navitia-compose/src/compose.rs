//! A platform made of several images, run with docker-compose.

use log::{info, warn};
use std::{
    collections::BTreeMap as Map,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use crate::{
    config::{Settings, DEFAULT_COMPOSED_PLATFORM, DEFAULT_DISTRIB},
    deploy::Deployer,
    error::{Error, Result},
    image::Image,
    lookup::find_container,
    models::HostRef,
    options::{expand_expose, ImageOptions},
    services::{Backends, CommandRunner, ContainerEngine, RemoteShell},
    template::{DescriptorRenderer, ImageRecord, TeraRenderer},
};

/// Which images a command runs on.
#[derive(Clone, Copy, Debug)]
pub enum Target<'a> {
    All,
    Host(&'a str),
    /// An empty list means every image.
    Hosts(&'a [String]),
}

struct Service {
    name: String,
    image: Image,
    record: ImageRecord,
}

pub struct ComposedPlatform {
    distrib: String,
    platform: String,
    settings: Settings,
    services: Vec<Service>,
    renderer: Box<dyn DescriptorRenderer>,
    output: Map<String, String>,
    engine: Box<dyn ContainerEngine>,
    shell: Box<dyn RemoteShell>,
    runner: Box<dyn CommandRunner>,
    deployer: Deployer,
}

impl ComposedPlatform {
    /// Loads `<template or platform>.yml.tera` from the templates directory.
    pub fn new(
        settings: Settings,
        distrib: Option<&str>,
        platform: Option<&str>,
        template: Option<&str>,
        backends: Backends,
    ) -> Result<ComposedPlatform> {
        let platform = platform.unwrap_or(DEFAULT_COMPOSED_PLATFORM);
        let renderer = TeraRenderer::load(&settings.templates_dir, template.unwrap_or(platform))?;

        Ok(ComposedPlatform::with_renderer(
            settings,
            distrib.unwrap_or(DEFAULT_DISTRIB),
            platform,
            Box::new(renderer),
            backends,
        ))
    }

    pub fn with_renderer(
        settings: Settings,
        distrib: &str,
        platform: &str,
        renderer: Box<dyn DescriptorRenderer>,
        backends: Backends,
    ) -> ComposedPlatform {
        ComposedPlatform {
            distrib: distrib.into(),
            platform: platform.into(),
            settings,
            services: Vec::new(),
            renderer,
            output: Map::new(),
            engine: backends.engine,
            shell: backends.shell,
            runner: backends.runner,
            deployer: Deployer::default(),
        }
    }

    pub fn distrib(&self) -> &str {
        &self.distrib
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn deployer_mut(&mut self) -> &mut Deployer {
        &mut self.deployer
    }

    /// Registers an image built from `<docker_root>/<distrib>/<name>`.
    ///
    /// Registering a name again replaces the previous declaration in place.
    pub fn add_image(&mut self, name: &str, options: &ImageOptions) -> Result<()> {
        let image = Image::composed(name, &self.distrib, &self.platform, options, &self.settings)?;
        let record = ImageRecord {
            name: name.into(),
            image: image.image_name().into(),
            links: options.links.clone(),
            ports: image.options().compose_ports(),
            expose: expand_expose(&options.expose)?,
            volumes: options.volumes.clone(),
        };
        let service = Service {
            name: name.into(),
            image,
            record,
        };

        match self.services.iter_mut().find(|service| service.name == name) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }

        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.services
            .iter()
            .map(|service| service.name.as_str())
            .collect()
    }

    pub fn image(&self, name: &str) -> Result<&Image> {
        self.services
            .iter()
            .find(|service| service.name == name)
            .map(|service| &service.image)
            .ok_or_else(|| Error::UnknownImage(name.into()))
    }

    /// Records handed to the descriptor template, in registration order.
    pub fn template_images(&self) -> Vec<&ImageRecord> {
        self.services.iter().map(|service| &service.record).collect()
    }

    /// Outputs of the last `run`, by image name.
    pub fn output(&self) -> &Map<String, String> {
        &self.output
    }

    /// Finds the container of every image again, e.g. after a restart.
    pub fn set_containers(&mut self) -> Result<()> {
        for service in self.services.iter_mut() {
            let image_name = service.image.image_name().to_owned();
            let container = find_container(self.engine.as_mut(), None, Some(&image_name), true)?;
            if container.is_none() {
                warn!("no container found for {}", image_name);
            }
            service.image.set_container(container.map(|container| container.id));
        }

        Ok(())
    }

    pub fn reset_containers(&mut self) {
        for service in self.services.iter_mut() {
            service.image.set_container(None);
        }
    }

    pub fn get_host(&mut self) -> Result<HostRef> {
        self.set_containers()?;

        let mut hosts = Map::new();
        for service in self.services.iter() {
            hosts.insert(
                service.name.clone(),
                service.image.get_host(self.engine.as_mut())?,
            );
        }

        Ok(HostRef::Composed(hosts))
    }

    pub fn build(&mut self) -> Result<()> {
        for service in self.services.iter() {
            service.image.build(self.engine.as_mut())?;
        }

        Ok(())
    }

    /// Removes every image, skipping the ones that do not exist.
    pub fn destroy(&mut self) -> Result<()> {
        for service in self.services.iter() {
            match service.image.destroy(self.engine.as_mut()) {
                Err(err) if err.is_not_found() => {
                    warn!("no image {}", service.image.image_name());
                }
                result => result?,
            }
        }

        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        for service in self.services.iter() {
            service.image.commit(self.engine.as_mut(), None)?;
        }

        Ok(())
    }

    /// Creates the containers through the engine, without docker-compose.
    pub fn create_containers(&mut self) -> Result<()> {
        for service in self.services.iter_mut() {
            service.image.create(self.engine.as_mut())?;
        }

        Ok(())
    }

    pub fn start_containers(&mut self) -> Result<()> {
        for service in self.services.iter() {
            service.image.start(self.engine.as_mut())?;
        }

        Ok(())
    }

    pub fn stop_containers(&mut self) -> Result<()> {
        for service in self.services.iter() {
            service.image.stop(self.engine.as_mut())?;
        }

        Ok(())
    }

    pub fn remove_containers(&mut self) -> Result<()> {
        for service in self.services.iter_mut() {
            service.image.remove(self.engine.as_mut())?;
        }

        Ok(())
    }

    /// Renders the descriptor and writes it to the descriptor path.
    pub fn create_yaml(&mut self) -> Result<PathBuf> {
        let records = self
            .services
            .iter()
            .map(|service| service.record.clone())
            .collect::<Vec<_>>();
        let descriptor = self.renderer.render(&records)?;

        let path = self.settings.descriptor_path.clone();
        fs::write(&path, descriptor)?;
        info!("wrote {}", path.display());

        Ok(path)
    }

    /// Runs `<compose_binary> <cmd>` from the project root.
    pub fn compose_cmd(&mut self, cmd: &str) -> Result<()> {
        let _cwd = WorkingDir::enter(&self.settings.root)?;
        let command_line = format!("{} {}", self.settings.compose_binary, cmd);
        info!("running {}", command_line);

        self.runner.run(&command_line)
    }

    pub fn up(&mut self) -> Result<()> {
        self.create_yaml()?;
        self.compose_cmd("up -d")?;
        self.set_containers()
    }

    /// Starts the platform as a whole with docker-compose, or image by
    /// image through the engine.
    pub fn start(&mut self, compose: bool) -> Result<()> {
        if compose {
            self.compose_cmd("start")
        } else {
            self.start_containers()
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        self.compose_cmd("stop")
    }

    pub fn rm(&mut self) -> Result<()> {
        self.compose_cmd("rm -f")?;
        self.reset_containers();

        Ok(())
    }

    /// Runs a shell command on the targeted containers and records the
    /// outputs by image name.
    ///
    /// Stops at the first failing container; outputs of the containers
    /// already done stay recorded.
    pub fn run(&mut self, cmd: &str, target: Target, sudo: bool) -> Result<()> {
        let names: Vec<String> = match target {
            Target::Host(name) => vec![name.to_owned()],
            Target::Hosts(names) if !names.is_empty() => names.to_vec(),
            Target::All | Target::Hosts(_) => {
                self.services.iter().map(|s| s.name.clone()).collect()
            }
        };
        let indexes = names
            .iter()
            .map(|name| {
                self.services
                    .iter()
                    .position(|service| service.name == *name)
                    .ok_or_else(|| Error::UnknownImage(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        self.output.clear();
        for index in indexes {
            let service = &mut self.services[index];
            service
                .image
                .run(self.engine.as_mut(), self.shell.as_mut(), cmd, sudo)?;
            let output = service.image.output().unwrap_or_default().to_owned();
            self.output.insert(service.name.clone(), output);
        }

        Ok(())
    }

    pub fn put(&mut self, name: &str, source: &Path, dest: &str, sudo: bool) -> Result<()> {
        let service = self
            .services
            .iter()
            .find(|service| service.name == name)
            .ok_or_else(|| Error::UnknownImage(name.into()))?;

        service
            .image
            .put(self.engine.as_mut(), self.shell.as_mut(), source, dest, sudo)
    }

    /// Binds the deployment roles to the containers of this platform.
    pub fn set_platform(&mut self) -> Result<()> {
        let hosts = self.get_host()?;
        self.deployer
            .set_platform(&self.platform, &self.distrib, &hosts)
    }

    pub fn execute(&mut self, cmd: &str, overrides: &Map<String, String>) -> Result<()> {
        self.deployer.execute(self.shell.as_mut(), cmd, overrides)
    }
}

impl fmt::Display for ComposedPlatform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let containers = self
            .services
            .iter()
            .map(|service| {
                service
                    .image
                    .container()
                    .map(|id| id.short().to_owned())
                    .unwrap_or_else(|| "-".into())
            })
            .collect::<Vec<_>>();

        write!(
            f,
            "ComposedPlatform images:{:?} containers:{:?}",
            self.names(),
            containers
        )
    }
}

/// Switches the process working directory until dropped.
struct WorkingDir {
    previous: PathBuf,
}

impl WorkingDir {
    fn enter(path: &Path) -> Result<WorkingDir> {
        let previous = env::current_dir()?;
        env::set_current_dir(path)?;

        Ok(WorkingDir { previous })
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        if let Err(err) = env::set_current_dir(&self.previous) {
            warn!(
                "could not go back to {}: {}",
                self.previous.display(),
                err
            );
        }
    }
}
