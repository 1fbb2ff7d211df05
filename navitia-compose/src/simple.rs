//! A platform running in a single container.

use std::{collections::BTreeMap as Map, fmt, path::Path};

use crate::{
    config::{Settings, DEFAULT_DISTRIB, DEFAULT_SIMPLE_PLATFORM},
    deploy::Deployer,
    error::Result,
    image::Image,
    lookup::find_container,
    models::{ContainerName, HostRef},
    options::ImageOptions,
    services::{Backends, ContainerEngine, RemoteShell},
};

pub struct SimplePlatform {
    distrib: String,
    platform: String,
    image: Image,
    engine: Box<dyn ContainerEngine>,
    shell: Box<dyn RemoteShell>,
    deployer: Deployer,
}

impl SimplePlatform {
    /// Validates the build context `<docker_root>/<distrib>` and the options
    /// right away.
    ///
    /// `image` defaults to `<image_prefix><distrib>` and `container` to
    /// `<container_prefix><platform>`.
    pub fn new(
        settings: &Settings,
        distrib: Option<&str>,
        platform: Option<&str>,
        image: Option<&str>,
        container: Option<&str>,
        options: &ImageOptions,
        backends: Backends,
    ) -> Result<SimplePlatform> {
        let distrib = distrib.unwrap_or(DEFAULT_DISTRIB);
        let platform = platform.unwrap_or(DEFAULT_SIMPLE_PLATFORM);
        let naming = &settings.naming;

        let image_name = match image {
            Some(image) => image.to_owned(),
            None => format!("{}{}", naming.image_prefix, distrib),
        };
        let (container_name, short_container_name) = match container {
            Some(container) => (container.to_owned(), container.to_owned()),
            None => (
                format!("{}{}", naming.container_prefix, platform),
                platform.to_owned(),
            ),
        };

        let image = Image::new(
            image_name,
            ContainerName(container_name),
            short_container_name,
            &settings.docker_root.join(distrib),
            options,
            settings,
        )?;

        Ok(SimplePlatform {
            distrib: distrib.into(),
            platform: platform.into(),
            image,
            engine: backends.engine,
            shell: backends.shell,
            deployer: Deployer::default(),
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn deployer_mut(&mut self) -> &mut Deployer {
        &mut self.deployer
    }

    pub fn build(&mut self) -> Result<()> {
        self.image.build(self.engine.as_mut())
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.image.destroy(self.engine.as_mut())
    }

    pub fn create(&mut self) -> Result<()> {
        self.image.create(self.engine.as_mut())
    }

    pub fn start(&mut self) -> Result<()> {
        self.image.start(self.engine.as_mut())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.image.stop(self.engine.as_mut())
    }

    pub fn remove(&mut self) -> Result<()> {
        self.image.remove(self.engine.as_mut())
    }

    pub fn commit(&mut self, repo: Option<&str>) -> Result<()> {
        self.image.commit(self.engine.as_mut(), repo)
    }

    /// Finds the container of the image again, e.g. after a restart.
    pub fn set_container(&mut self) -> Result<()> {
        let container = find_container(
            self.engine.as_mut(),
            Some(self.image.container_name().0.as_str()),
            Some(self.image.image_name()),
            true,
        )?;
        self.image.set_container(container.map(|container| container.id));

        Ok(())
    }

    pub fn inspect(&mut self, field: &str) -> Result<Option<serde_json::Value>> {
        self.image.inspect(self.engine.as_mut(), field)
    }

    pub fn get_host(&mut self) -> Result<HostRef> {
        Ok(HostRef::Single(self.image.get_host(self.engine.as_mut())?))
    }

    pub fn run(&mut self, cmd: &str, sudo: bool) -> Result<()> {
        self.image
            .run(self.engine.as_mut(), self.shell.as_mut(), cmd, sudo)
    }

    pub fn put(&mut self, source: &Path, dest: &str, sudo: bool) -> Result<()> {
        self.image
            .put(self.engine.as_mut(), self.shell.as_mut(), source, dest, sudo)
    }

    pub fn set_platform(&mut self) -> Result<()> {
        let hosts = self.get_host()?;
        self.deployer
            .set_platform(&self.platform, &self.distrib, &hosts)
    }

    pub fn execute(&mut self, cmd: &str, overrides: &Map<String, String>) -> Result<()> {
        self.deployer.execute(self.shell.as_mut(), cmd, overrides)
    }
}

impl fmt::Display for SimplePlatform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let container = self
            .image
            .container()
            .map(|id| id.0.as_str())
            .unwrap_or("None");

        write!(
            f,
            "SimplePlatform image:{} container:{}",
            self.image.image_name(),
            container
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Naming,
        deploy::{DeployEnv, Namespace},
        error::Error,
        options::PortSpec,
        testing::{backends, build_context, project},
    };

    #[test]
    fn default_names() {
        let (_root, settings) = project();
        build_context(&settings, &["debian8"]);
        let (backends, _, _, _) = backends();

        let platform =
            SimplePlatform::new(&settings, None, None, None, None, &Default::default(), backends)
                .unwrap();

        assert_eq!(platform.image().image_name(), "navitia/debian8");
        assert_eq!(platform.image().container_name().0, "navitia_simple");
        assert_eq!(
            platform.to_string(),
            "SimplePlatform image:navitia/debian8 container:None"
        );
    }

    #[test]
    fn explicit_container_is_the_short_name() {
        let (_root, mut settings) = project();
        settings.naming = Naming::from_prefix("acme");
        build_context(&settings, &["debian8"]);
        let (backends, engine, _, _) = backends();

        let mut platform = SimplePlatform::new(
            &settings,
            None,
            Some("artemis"),
            None,
            Some("navitia_artemis"),
            &Default::default(),
            backends,
        )
        .unwrap();
        platform.create().unwrap();
        platform.commit(None).unwrap();

        assert_eq!(platform.image().image_name(), "acme/debian8");
        assert_eq!(
            engine.borrow().commits[0],
            (
                "navitia_artemis".to_owned(),
                "acme/debian8_navitia_artemis".to_owned()
            )
        );
    }

    #[test]
    fn bad_declarations_fail_at_construction() {
        let (_root, settings) = project();
        let (collaborators, _, _, _) = backends();
        let result = SimplePlatform::new(
            &settings,
            Some("debian7"),
            None,
            None,
            None,
            &Default::default(),
            collaborators,
        );
        assert!(matches!(result, Err(Error::Configuration { .. })));

        build_context(&settings, &["debian8"]);
        let options = ImageOptions {
            ports: vec![PortSpec::from("0.0.0.0:80:80")],
            ..Default::default()
        };
        let (collaborators, _, _, _) = backends();
        let result = SimplePlatform::new(&settings, None, None, None, None, &options, collaborators);
        assert!(matches!(result, Err(Error::UnsupportedPortSpec(_))));
    }

    #[test]
    fn lifecycle_and_deployment() {
        let (_root, settings) = project();
        build_context(&settings, &["debian8"]);
        let (backends, engine, shell, _) = backends();
        engine.borrow_mut().address = "172.17.0.7".into();
        let mut platform =
            SimplePlatform::new(&settings, None, None, None, None, &Default::default(), backends)
                .unwrap();
        platform.deployer_mut().tasks_mut().register(
            Namespace::Tasks,
            "deploy_from_scratch",
            Box::new(|env: &DeployEnv, shell: &mut dyn RemoteShell| -> Result<()> {
                for host in env.hosts() {
                    shell.run(&crate::services::RemoteSettings::new(host), "true")?;
                }
                Ok(())
            }),
        );

        platform.build().unwrap();
        platform.create().unwrap();
        platform.start().unwrap();
        assert_eq!(
            platform.get_host().unwrap(),
            HostRef::Single("git@172.17.0.7".into())
        );
        platform.set_platform().unwrap();
        platform
            .execute("deploy_from_scratch", &Map::new())
            .unwrap();
        platform.run("hostname", false).unwrap();
        platform.stop().unwrap();
        platform.remove().unwrap();
        platform.destroy().unwrap();

        assert!(platform.image().container().is_none());
        assert_eq!(platform.image().output(), Some("hostname"));
        let shell = shell.borrow();
        assert_eq!(shell.calls[0].0.host_string, "git@172.17.0.7");
        assert_eq!(engine.borrow().removed_images, vec!["navitia/debian8"]);
    }

    #[test]
    fn set_container_finds_it_again() {
        let (_root, settings) = project();
        build_context(&settings, &["debian8"]);
        let (backends, engine, _, _) = backends();
        engine
            .borrow_mut()
            .add_container("feedbeef", "navitia_simple", "navitia/debian8:latest");
        let mut platform =
            SimplePlatform::new(&settings, None, None, None, None, &Default::default(), backends)
                .unwrap();

        platform.set_container().unwrap();

        assert_eq!(platform.image().container().unwrap().0, "feedbeef");
    }
}
