//! Platform provisioning and named deployment tasks.
//!
//! Platform routines bind the deployment roles to the hosts of a running
//! platform. Tasks are looked up by name, first among the `tasks`, then
//! among the `component` namespace.

use log::{debug, info};
use std::collections::BTreeMap as Map;

use crate::{
    config::{PlatformFile, DEFAULT_COMPOSED_PLATFORM, DEFAULT_SIMPLE_PLATFORM},
    error::{Error, Result},
    models::HostRef,
    services::{RemoteSettings, RemoteShell},
};

pub const ALL_ROLE: &str = "all";

/// Variables and role bindings visible to the deployment tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployEnv {
    pub vars: Map<String, String>,
    /// Role name to host strings.
    pub roles: Map<String, Vec<String>>,
    pub hide_stdout: bool,
}

impl DeployEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|value| value.as_str())
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.vars.insert(key.into(), value.into());
    }

    /// A copy of the environment with `overrides` applied on top.
    pub fn with_overrides(&self, overrides: &Map<String, String>) -> DeployEnv {
        let mut env = self.clone();
        env.vars
            .extend(overrides.iter().map(|(key, value)| (key.clone(), value.clone())));
        env
    }

    /// Every bound host, once, in role order.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        for host in self.roles.values().flatten() {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }
}

pub type PlatformRoutine = Box<dyn Fn(&mut DeployEnv, &HostRef) -> Result<()>>;

pub type Task = Box<dyn Fn(&DeployEnv, &mut dyn RemoteShell) -> Result<()>>;

pub struct PlatformRegistry {
    routines: Map<String, PlatformRoutine>,
}

impl PlatformRegistry {
    pub fn new() -> PlatformRegistry {
        PlatformRegistry {
            routines: Map::new(),
        }
    }

    /// A registry holding the `simple` and `composed` platforms.
    pub fn with_builtins() -> PlatformRegistry {
        let mut registry = PlatformRegistry::new();
        registry.register(DEFAULT_SIMPLE_PLATFORM, Box::new(simple_platform));
        registry.register(DEFAULT_COMPOSED_PLATFORM, Box::new(composed_platform));
        registry
    }

    pub fn register<S: Into<String>>(&mut self, name: S, routine: PlatformRoutine) {
        self.routines.insert(name.into(), routine);
    }

    pub fn get(&self, name: &str) -> Result<&PlatformRoutine> {
        self.routines
            .get(name)
            .ok_or_else(|| Error::UnknownPlatform(name.into()))
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        PlatformRegistry::with_builtins()
    }
}

fn simple_platform(env: &mut DeployEnv, hosts: &HostRef) -> Result<()> {
    let host = match hosts {
        HostRef::Single(host) => host,
        HostRef::Composed(_) => {
            return Err(Error::PlatformHosts {
                platform: DEFAULT_SIMPLE_PLATFORM.into(),
                expected: "a single host",
            })
        }
    };
    env.roles.insert(ALL_ROLE.into(), vec![host.clone()]);

    Ok(())
}

fn composed_platform(env: &mut DeployEnv, hosts: &HostRef) -> Result<()> {
    let hosts = match hosts {
        HostRef::Composed(hosts) => hosts,
        HostRef::Single(_) => {
            return Err(Error::PlatformHosts {
                platform: DEFAULT_COMPOSED_PLATFORM.into(),
                expected: "one host per image",
            })
        }
    };
    for (name, host) in hosts {
        env.roles.insert(name.clone(), vec![host.clone()]);
    }
    env.roles
        .insert(ALL_ROLE.into(), hosts.values().cloned().collect());

    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Namespace {
    Tasks,
    Component,
}

pub struct TaskRegistry {
    tasks: Map<String, Task>,
    component: Map<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> TaskRegistry {
        TaskRegistry {
            tasks: Map::new(),
            component: Map::new(),
        }
    }

    /// Registers the shell command lists declared in a platform file.
    pub fn from_platform_file(file: &PlatformFile) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for (name, commands) in file.tasks.iter() {
            registry.register(Namespace::Tasks, name, shell_task(commands.clone()));
        }
        for (name, commands) in file.component.iter() {
            registry.register(Namespace::Component, name, shell_task(commands.clone()));
        }
        registry
    }

    pub fn register<S: Into<String>>(&mut self, namespace: Namespace, name: S, task: Task) {
        let tasks = match namespace {
            Namespace::Tasks => &mut self.tasks,
            Namespace::Component => &mut self.component,
        };
        tasks.insert(name.into(), task);
    }

    pub fn lookup(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .or_else(|| self.component.get(name))
            .ok_or_else(|| Error::UnknownCommand(name.into()))
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        TaskRegistry::new()
    }
}

/// A task running `commands` in order on every bound host, with the
/// environment variables exported.
pub fn shell_task(commands: Vec<String>) -> Task {
    Box::new(move |env: &DeployEnv, shell: &mut dyn RemoteShell| -> Result<()> {
        for host in env.hosts() {
            let settings = RemoteSettings::new(host).hide_stdout(env.hide_stdout);
            for command in commands.iter() {
                shell.run(&settings, &with_exports(&env.vars, command)?)?;
            }
        }
        Ok(())
    })
}

fn with_exports(vars: &Map<String, String>, command: &str) -> Result<String> {
    let mut line = String::new();
    for (key, value) in vars {
        if !is_variable_name(key) {
            return Err(Error::InvalidOption {
                spec: key.clone(),
                reason: "not a shell variable name".into(),
            });
        }
        let quoted = shlex::try_quote(value).map_err(|_| Error::InvalidOption {
            spec: key.clone(),
            reason: "value cannot be quoted for a shell".into(),
        })?;
        line.push_str(&format!("export {}={}; ", key, quoted));
    }
    line.push_str(command);

    Ok(line)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Runs platform routines and tasks against a deployment environment.
pub struct Deployer {
    env: DeployEnv,
    platforms: PlatformRegistry,
    tasks: TaskRegistry,
}

impl Deployer {
    pub fn new(platforms: PlatformRegistry, tasks: TaskRegistry) -> Deployer {
        Deployer {
            env: DeployEnv::default(),
            platforms,
            tasks,
        }
    }

    pub fn env(&self) -> &DeployEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut DeployEnv {
        &mut self.env
    }

    pub fn tasks_mut(&mut self) -> &mut TaskRegistry {
        &mut self.tasks
    }

    pub fn platforms_mut(&mut self) -> &mut PlatformRegistry {
        &mut self.platforms
    }

    pub fn set_platform(&mut self, platform: &str, distrib: &str, hosts: &HostRef) -> Result<()> {
        let routine = self.platforms.get(platform)?;
        self.env.set("distrib", distrib);
        info!("setting up platform {} on {:?}", platform, hosts.hosts());

        routine(&mut self.env, hosts)
    }

    /// Runs the named task with `overrides` applied for this call only.
    pub fn execute(
        &self,
        shell: &mut dyn RemoteShell,
        cmd: &str,
        overrides: &Map<String, String>,
    ) -> Result<()> {
        let task = self.tasks.lookup(cmd)?;
        let mut env = self.env.with_overrides(overrides);
        env.hide_stdout = true;
        debug!("executing {} with {:?}", cmd, overrides);

        task(&env, shell)
    }
}

impl Default for Deployer {
    fn default() -> Self {
        Deployer::new(PlatformRegistry::with_builtins(), TaskRegistry::new())
    }
}
