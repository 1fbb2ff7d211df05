pub use docker::DockerBackend;
pub use local::ShellRunner;
pub use ssh::SshShell;

mod docker;
mod local;
mod ssh;
