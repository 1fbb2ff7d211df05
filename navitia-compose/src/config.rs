use serde::Deserialize;
use std::{
    collections::BTreeMap as Map,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{error::Result, options::ImageOptions, options::PortSpec};

pub const DEFAULT_DISTRIB: &str = "debian8";
pub const DEFAULT_SIMPLE_PLATFORM: &str = "simple";
pub const DEFAULT_COMPOSED_PLATFORM: &str = "composed";
pub const DEFAULT_COMMAND: &str = "deploy_from_scratch";

/// Prefixes of the image and container names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Naming {
    pub image_prefix: String,
    pub container_prefix: String,
}

impl Naming {
    pub fn from_prefix(prefix: &str) -> Naming {
        Naming {
            image_prefix: format!("{}/", prefix),
            container_prefix: format!("{}_", prefix),
        }
    }
}

impl Default for Naming {
    fn default() -> Self {
        Naming::from_prefix("navitia")
    }
}

/// Layout of a deployment project and the knobs shared by every image.
#[derive(Clone, Debug)]
pub struct Settings {
    pub root: PathBuf,
    /// Holds one build context per distribution and image.
    pub docker_root: PathBuf,
    pub templates_dir: PathBuf,
    /// Public key copied in every build context.
    pub key_file: PathBuf,
    /// Private key used to reach the containers over ssh.
    pub identity_file: Option<PathBuf>,
    pub descriptor_path: PathBuf,
    pub compose_binary: String,
    pub remote_user: String,
    pub naming: Naming,
    pub verbose: bool,
}

impl Settings {
    pub fn new<P: Into<PathBuf>>(root: P) -> Settings {
        let root = root.into();
        Settings {
            docker_root: root.join("docker"),
            templates_dir: root.join("templates"),
            key_file: root.join("platforms").join("unsecure_key.pub"),
            identity_file: None,
            descriptor_path: root.join("docker-compose.yml"),
            compose_binary: "docker-compose".into(),
            remote_user: "git".into(),
            naming: Naming::default(),
            verbose: false,
            root,
        }
    }
}

/// A named image of a composed platform.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ImageDeclaration {
    pub name: String,

    #[serde(flatten)]
    pub options: ImageOptions,
}

/// Declarative description of a platform, read from a YAML file.
///
/// A file with `images` describes a composed platform, otherwise the
/// top-level `ports` and `volumes` describe a single container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PlatformFile {
    pub distrib: Option<String>,

    pub platform: Option<String>,

    pub template: Option<String>,

    pub prefix: Option<String>,

    pub image: Option<String>,

    pub container: Option<String>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub images: Vec<ImageDeclaration>,

    /// Deployment tasks, as shell commands run on every host.
    #[serde(default)]
    pub tasks: Map<String, Vec<String>>,

    #[serde(default)]
    pub component: Map<String, Vec<String>>,
}

impl PlatformFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PlatformFile> {
        let file = File::open(path.as_ref())?;
        let platform = serde_yaml::from_reader(file)?;

        Ok(platform)
    }

    pub fn is_composed(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn distrib(&self) -> &str {
        self.distrib.as_deref().unwrap_or(DEFAULT_DISTRIB)
    }

    pub fn platform(&self) -> &str {
        let default = if self.is_composed() {
            DEFAULT_COMPOSED_PLATFORM
        } else {
            DEFAULT_SIMPLE_PLATFORM
        };
        self.platform.as_deref().unwrap_or(default)
    }

    pub fn naming(&self) -> Naming {
        self.prefix
            .as_deref()
            .map(Naming::from_prefix)
            .unwrap_or_default()
    }

    /// Options of the single container variant.
    pub fn options(&self) -> ImageOptions {
        ImageOptions {
            volumes: self.volumes.clone(),
            ports: self.ports.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_from_prefix() {
        let naming = Naming::from_prefix("acme");

        assert_eq!(naming.image_prefix, "acme/");
        assert_eq!(naming.container_prefix, "acme_");
        assert_eq!(Naming::default(), Naming::from_prefix("navitia"));
    }

    #[test]
    fn settings_derive_layout_from_root() {
        let settings = Settings::new("/opt/deploy");

        assert_eq!(settings.docker_root, Path::new("/opt/deploy/docker"));
        assert_eq!(
            settings.key_file,
            Path::new("/opt/deploy/platforms/unsecure_key.pub")
        );
        assert_eq!(
            settings.descriptor_path,
            Path::new("/opt/deploy/docker-compose.yml")
        );
    }

    #[test]
    fn composed_platform_file() {
        let yaml = r#"
distrib: debian8
prefix: acme
images:
  - name: tyr
    ports: ["5000-5001"]
    links: [db]
  - name: db
    volumes: ["/srv/pg:/var/lib/postgresql"]
tasks:
  deploy_from_scratch:
    - "apt-get update"
"#;
        let file: PlatformFile = serde_yaml::from_str(yaml).unwrap();

        assert!(file.is_composed());
        assert_eq!(file.platform(), "composed");
        assert_eq!(file.naming().container_prefix, "acme_");
        assert_eq!(file.images[0].name, "tyr");
        assert_eq!(file.images[0].options.links, vec!["db"]);
        assert_eq!(file.images[1].options.volumes.len(), 1);
        assert_eq!(file.tasks["deploy_from_scratch"], vec!["apt-get update"]);
    }

    #[test]
    fn simple_platform_file_defaults() {
        let file: PlatformFile = serde_yaml::from_str("ports: [80]\n").unwrap();

        assert!(!file.is_composed());
        assert_eq!(file.distrib(), "debian8");
        assert_eq!(file.platform(), "simple");
        assert_eq!(file.options().ports, vec![PortSpec::Number(80)]);
    }
}
