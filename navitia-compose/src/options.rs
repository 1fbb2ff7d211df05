//! Normalization of the per-image options declared in a platform file.
//!
//! Ports may be declared as integers or strings (`"80"`, `"8000-8010"`,
//! `"9000:9001"`), volumes as `"host:guest"` path pairs. Both are turned
//! into the canonical form used for container creation and for rendering
//! the compose descriptor.

use serde::{Deserialize, Serialize};
use std::{ops::RangeInclusive, path::Path};

use crate::{
    error::{Error, Result},
    models::{Bind, HostConfig},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(u16),
    Text(String),
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::Number(port)
    }
}

impl From<&str> for PortSpec {
    fn from(spec: &str) -> Self {
        PortSpec::Text(spec.into())
    }
}

/// Options accepted by an image declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub links: Vec<String>,

    #[serde(default)]
    pub expose: Vec<PortSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedOptions {
    /// Declared ports, sorted. A `host:guest` spec contributes its host port.
    pub ports: Vec<u16>,
    /// Guest paths, in declaration order.
    pub volumes: Vec<String>,
    pub host_config: HostConfig,
}

impl NormalizedOptions {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.volumes.is_empty()
    }

    /// Port entries as written in a compose file, ordered by guest port.
    pub fn compose_ports(&self) -> Vec<String> {
        self.host_config
            .port_bindings
            .iter()
            .map(|(guest, host)| match host {
                Some(host) => format!("{}:{}", host, guest),
                None => guest.to_string(),
            })
            .collect()
    }
}

pub fn normalize(options: &ImageOptions) -> Result<NormalizedOptions> {
    let mut normalized = NormalizedOptions::default();

    for volume in options.volumes.iter() {
        let (host, guest) = parse_volume(volume)?;
        normalized.volumes.push(guest.clone());
        normalized
            .host_config
            .binds
            .insert(host, Bind { bind: guest, ro: false });
    }

    for spec in options.ports.iter() {
        match spec {
            PortSpec::Number(port) => {
                normalized.host_config.port_bindings.insert(*port, None);
                normalized.ports.push(*port);
            }
            PortSpec::Text(text) if text.contains(':') => {
                let (host, guest) = parse_binding(text)?;
                normalized.host_config.port_bindings.insert(guest, Some(host));
                normalized.ports.push(host);
            }
            PortSpec::Text(text) if text.contains('-') => {
                for port in parse_range(text)? {
                    normalized.host_config.port_bindings.insert(port, None);
                    normalized.ports.push(port);
                }
            }
            PortSpec::Text(text) => {
                let port = parse_port(text, text)?;
                normalized.host_config.port_bindings.insert(port, None);
                normalized.ports.push(port);
            }
        }
    }
    normalized.ports.sort();

    Ok(normalized)
}

/// Expands `expose` specs into a sorted list of ports.
pub fn expand_expose(specs: &[PortSpec]) -> Result<Vec<u16>> {
    let mut expose = Vec::new();
    for spec in specs {
        match spec {
            PortSpec::Number(port) => expose.push(*port),
            PortSpec::Text(text) if text.contains('-') => expose.extend(parse_range(text)?),
            PortSpec::Text(text) => expose.push(parse_port(text, text)?),
        }
    }
    expose.sort();

    Ok(expose)
}

fn parse_volume(spec: &str) -> Result<(String, String)> {
    let mut parts = spec.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(guest), None) if !host.is_empty() && !guest.is_empty() => {
            Ok((expand_home(host), guest.to_owned()))
        }
        _ => Err(Error::InvalidOption {
            spec: spec.into(),
            reason: "expected host_path:guest_path".into(),
        }),
    }
}

fn expand_home(path: &str) -> String {
    let rest = if path == "~" {
        ""
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        return path.to_owned();
    };

    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home.to_string_lossy().into_owned(),
        Some(home) => home.join(Path::new(rest)).to_string_lossy().into_owned(),
        None => path.to_owned(),
    }
}

fn parse_binding(spec: &str) -> Result<(u16, u16)> {
    let parts = spec.split(':').collect::<Vec<_>>();
    match parts.as_slice() {
        [host, guest] => Ok((parse_port(host, spec)?, parse_port(guest, spec)?)),
        _ => Err(Error::UnsupportedPortSpec(spec.into())),
    }
}

fn parse_range(spec: &str) -> Result<RangeInclusive<u16>> {
    let mut parts = spec.splitn(2, '-');
    let start = parse_port(parts.next().unwrap_or_default(), spec)?;
    let end = parse_port(parts.next().unwrap_or_default(), spec)?;
    if start > end {
        return Err(Error::InvalidOption {
            spec: spec.into(),
            reason: "range start is greater than its end".into(),
        });
    }

    Ok(start..=end)
}

fn parse_port(value: &str, spec: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| Error::InvalidOption {
        spec: spec.into(),
        reason: format!("{:?} is not a port number", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(specs: &[PortSpec]) -> ImageOptions {
        ImageOptions {
            ports: specs.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn mixed_port_specs_are_expanded_and_sorted() {
        let options = ports(&["80".into(), "8000-8002".into(), "9000:9001".into()]);
        let normalized = normalize(&options).unwrap();

        assert_eq!(normalized.ports, vec![80, 8000, 8001, 8002, 9000]);
        assert_eq!(normalized.host_config.port_bindings.get(&9001), Some(&Some(9000)));
        assert_eq!(normalized.host_config.port_bindings.get(&80), Some(&None));
        assert_eq!(normalized.host_config.port_bindings.get(&8001), Some(&None));
        assert!(!normalized.host_config.port_bindings.contains_key(&9000));
    }

    #[test]
    fn integer_ports_are_unassigned() {
        let normalized = normalize(&ports(&[5432.into(), 22.into()])).unwrap();

        assert_eq!(normalized.ports, vec![22, 5432]);
        assert_eq!(normalized.compose_ports(), vec!["22", "5432"]);
    }

    #[test]
    fn compose_ports_render_bindings() {
        let normalized = normalize(&ports(&["8080:80".into(), 443.into()])).unwrap();

        assert_eq!(normalized.compose_ports(), vec!["8080:80", "443"]);
    }

    #[test]
    fn triple_port_spec_is_rejected() {
        let err = normalize(&ports(&["127.0.0.1:8080:80".into()])).unwrap_err();

        match err {
            Error::UnsupportedPortSpec(spec) => assert_eq!(spec, "127.0.0.1:8080:80"),
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn malformed_ports_are_rejected() {
        assert!(matches!(
            normalize(&ports(&["http".into()])),
            Err(Error::InvalidOption { .. })
        ));
        assert!(matches!(
            normalize(&ports(&["9000-8000".into()])),
            Err(Error::InvalidOption { .. })
        ));
        assert!(matches!(
            normalize(&ports(&["80:".into()])),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn volumes_become_binds() {
        let options = ImageOptions {
            volumes: vec!["/srv/ed:/srv/ed/data".into(), "/var/log:/var/log/navitia".into()],
            ..Default::default()
        };
        let normalized = normalize(&options).unwrap();

        assert_eq!(normalized.volumes, vec!["/srv/ed/data", "/var/log/navitia"]);
        assert_eq!(
            normalized.host_config.binds.get("/srv/ed"),
            Some(&Bind {
                bind: "/srv/ed/data".into(),
                ro: false
            })
        );
    }

    #[test]
    fn volume_home_is_expanded() {
        let options = ImageOptions {
            volumes: vec!["~/data:/data".into()],
            ..Default::default()
        };
        let normalized = normalize(&options).unwrap();
        let host = normalized.host_config.binds.keys().next().unwrap();

        if dirs::home_dir().is_some() {
            assert!(!host.starts_with('~'));
            assert!(host.ends_with("data"));
        }
    }

    #[test]
    fn malformed_volume_is_rejected() {
        let options = ImageOptions {
            volumes: vec!["/srv/ed".into()],
            ..Default::default()
        };

        assert!(matches!(normalize(&options), Err(Error::InvalidOption { .. })));
    }

    #[test]
    fn empty_options_normalize_to_nothing() {
        let normalized = normalize(&ImageOptions::default()).unwrap();

        assert!(normalized.is_empty());
        assert_eq!(normalized.host_config, HostConfig::default());
    }

    #[test]
    fn expose_ranges_are_expanded() {
        let expose = expand_expose(&["5000-5002".into(), 22.into(), "80".into()]).unwrap();

        assert_eq!(expose, vec![22, 80, 5000, 5001, 5002]);
    }

    #[test]
    fn options_parse_from_yaml() {
        let options: ImageOptions =
            serde_yaml::from_str("ports: [80, \"8000-8001\"]\nlinks: [db]\n").unwrap();

        assert_eq!(options.ports, vec![PortSpec::Number(80), "8000-8001".into()]);
        assert_eq!(options.links, vec!["db"]);
        assert!(options.volumes.is_empty());
    }
}
