use serde::Serialize;
use std::{collections::BTreeMap as Map, fmt};

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageId(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerId(pub String);

impl ContainerId {
    /// The first 8 characters, as printed by `docker ps`.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(index, _)| index)
            .unwrap_or_else(|| self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerName(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: ImageId,
    pub repo_tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// Engine names carry a leading `/`.
    pub names: Vec<String>,
    pub image: String,
}

/// Strips the `:tag` suffix of an image reference, keeping registry ports.
pub fn untagged(reference: &str) -> &str {
    match reference.rfind(':') {
        Some(index) if !reference[index..].contains('/') => &reference[..index],
        _ => reference,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bind {
    pub bind: String,
    pub ro: bool,
}

/// Binds and port bindings handed to the engine on container creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostConfig {
    /// Host path to guest mount.
    pub binds: Map<String, Bind>,
    /// Guest port to host port, `None` lets the engine pick one.
    pub port_bindings: Map<u16, Option<u16>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image_name: String,
    pub container_name: ContainerName,
    pub host_config: Option<HostConfig>,
    pub ports: Vec<u16>,
    pub volumes: Vec<String>,
}

/// Where the remote execution layer connects to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostRef {
    Single(String),
    Composed(Map<String, String>),
}

impl HostRef {
    pub fn hosts(&self) -> Vec<&str> {
        match self {
            HostRef::Single(host) => vec![host.as_str()],
            HostRef::Composed(hosts) => hosts.values().map(|host| host.as_str()).collect(),
        }
    }
}
