use log::debug;
use std::process::Command;

use crate::{
    error::{Error, Result},
    services::CommandRunner,
};

/// Runs command lines with `sh -c` in the current directory, inheriting
/// the standard streams.
#[derive(Clone, Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command_line: &str) -> Result<()> {
        debug!("sh -c {:?}", command_line);
        let status = Command::new("sh").arg("-c").arg(command_line).status()?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Command {
                command: command_line.into(),
                status: status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_is_checked() {
        let mut runner = ShellRunner;

        runner.run("true").unwrap();
        match runner.run("exit 3") {
            Err(Error::Command { command, .. }) => assert_eq!(command, "exit 3"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
