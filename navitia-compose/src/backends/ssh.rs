use log::{debug, info};
use std::{
    io::{stdout, Write},
    path::{Path, PathBuf},
    process::{Command, Output},
};

use crate::{
    error::{Error, Result},
    services::{RemoteSettings, RemoteShell},
};

const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "LogLevel=ERROR",
];

/// Reaches the containers with the `ssh` and `scp` clients.
#[derive(Clone, Debug, Default)]
pub struct SshShell {
    identity_file: Option<PathBuf>,
}

impl SshShell {
    pub fn new(identity_file: Option<PathBuf>) -> SshShell {
        SshShell { identity_file }
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = SSH_OPTIONS
            .iter()
            .map(|arg| (*arg).to_owned())
            .collect::<Vec<_>>();
        if let Some(identity_file) = &self.identity_file {
            args.push("-i".into());
            args.push(identity_file.to_string_lossy().into_owned());
        }
        args
    }

    fn ssh_args(&self, host_string: &str, cmd: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(host_string.into());
        args.push(cmd.into());
        args
    }

    fn scp_args(&self, source: &Path, host_string: &str, dest: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push("-r".into());
        args.push(source.to_string_lossy().into_owned());
        args.push(format!("{}:{}", host_string, dest));
        args
    }

    fn exec(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        debug!("[{}] {}", settings.host_string, cmd);
        let output = Command::new("ssh")
            .args(self.ssh_args(&settings.host_string, cmd))
            .output()?;
        let stdout_text = check(settings, cmd, &output)?;

        if !settings.hide_stdout {
            stdout().write_all(&output.stdout)?;
        }

        Ok(stdout_text.trim_end().to_owned())
    }
}

fn check(settings: &RemoteSettings, cmd: &str, output: &Output) -> Result<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        debug!("{}", String::from_utf8_lossy(&output.stderr));
        Err(Error::Remote {
            host: settings.host_string.clone(),
            command: cmd.into(),
            status: output.status.to_string(),
        })
    }
}

fn sudo_line(cmd: &str) -> Result<String> {
    let quoted = shlex::try_quote(cmd).map_err(|_| Error::InvalidOption {
        spec: cmd.into(),
        reason: "command cannot be quoted for a shell".into(),
    })?;

    Ok(format!("sudo sh -c {}", quoted))
}

impl RemoteShell for SshShell {
    fn run(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.exec(settings, cmd)
    }

    fn sudo(&mut self, settings: &RemoteSettings, cmd: &str) -> Result<String> {
        self.exec(settings, &sudo_line(cmd)?)
    }

    /// Copies to a fresh `mktemp` file first when `use_sudo` is set, then
    /// moves it in place as root.
    fn put(
        &mut self,
        settings: &RemoteSettings,
        source: &Path,
        dest: &str,
        use_sudo: bool,
    ) -> Result<()> {
        let staging = if use_sudo {
            self.exec(&settings.clone().hide_stdout(true), "mktemp")?
        } else {
            dest.to_owned()
        };

        info!("uploading {} to {}:{}", source.display(), settings.host_string, dest);
        let output = Command::new("scp")
            .args(self.scp_args(source, &settings.host_string, &staging))
            .output()?;
        check(settings, &format!("scp {}", source.display()), &output)?;

        if use_sudo {
            self.sudo(settings, &move_line(&staging, dest)?)?;
        }

        Ok(())
    }
}

fn move_line(staging: &str, dest: &str) -> Result<String> {
    let quote = |path: &str| {
        shlex::try_quote(path)
            .map(|quoted| quoted.into_owned())
            .map_err(|_| Error::InvalidOption {
                spec: path.into(),
                reason: "path cannot be quoted for a shell".into(),
            })
    };

    Ok(format!("mv {} {}", quote(staging)?, quote(dest)?))
}
