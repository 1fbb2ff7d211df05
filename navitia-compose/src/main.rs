use anyhow::{anyhow, Context, Result};
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    collections::BTreeMap as Map,
    env,
    io::{stdout, Write},
    path::PathBuf,
};
use structopt::StructOpt;

use navitia_compose::{
    backends::{DockerBackend, ShellRunner, SshShell},
    config::DEFAULT_COMMAND,
    deploy::{Deployer, PlatformRegistry, TaskRegistry},
    models::HostRef,
    services::Backends,
    ComposedPlatform, PlatformFile, Settings, SimplePlatform, Target,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "navitia-compose",
    about = "Builds and runs the Docker images of a navitia platform, then deploys to them."
)]
struct Opt {
    #[structopt(long, parse(from_os_str))]
    /// Project root, holding docker/, templates/ and platforms/.
    root: Option<PathBuf>,

    #[structopt(short, long, parse(from_os_str), default_value = "platform.yml")]
    /// Platform file, relative to the project root.
    file: PathBuf,

    #[structopt(long)]
    /// Docker endpoint, unix:// or tcp://. Defaults to DOCKER_HOST or the local socket.
    docker_host: Option<String>,

    #[structopt(short, long)]
    /// Echo build transcripts and remote output.
    verbose: bool,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Renders docker-compose.yml for a composed platform.
    Yaml,
    Build,
    /// Creates and starts the containers.
    Up,
    Create,
    Start {
        #[structopt(long)]
        /// Start image by image through the engine instead of docker-compose.
        engine: bool,
    },
    Stop,
    Rm,
    /// Removes the images.
    Destroy,
    Commit {
        #[structopt(long)]
        repo: Option<String>,
    },
    /// Runs a shell command in the containers.
    Run {
        cmd: String,

        #[structopt(long = "host")]
        /// Image names to target, all of them when omitted.
        hosts: Vec<String>,

        #[structopt(long)]
        sudo: bool,
    },
    /// Prints the ssh host strings of the containers.
    Hosts,
    /// Runs a deployment task against the containers.
    Deploy {
        cmd: Option<String>,

        #[structopt(long = "let", parse(try_from_str = parse_assignment))]
        /// Environment override, as key=value.
        overrides: Vec<(String, String)>,
    },
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let mut parts = s.splitn(2, '=');
    match (parts.next(), parts.next()) {
        (Some(key), Some(value)) if !key.is_empty() => Ok((key.into(), value.into())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

enum Platform {
    Simple(SimplePlatform),
    Composed(ComposedPlatform),
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    let mut stdout = stdout();

    let root = match &opt.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };
    let file_path = root.join(&opt.file);
    let file = PlatformFile::open(&file_path)
        .with_context(|| format!("couldn't read platform file {:?}", file_path))?;
    info!("found platform file {:?}", file_path);

    let mut settings = Settings::new(&root);
    settings.naming = file.naming();
    settings.verbose = opt.verbose;
    let identity_file = root.join("platforms").join("unsecure_key");
    if identity_file.exists() {
        settings.identity_file = Some(identity_file);
    }

    let engine = DockerBackend::connect(opt.docker_host.as_deref())?;
    info!("connected to docker");

    let backends = Backends {
        engine: Box::new(engine),
        shell: Box::new(SshShell::new(settings.identity_file.clone())),
        runner: Box::new(ShellRunner),
    };
    let deployer = Deployer::new(
        PlatformRegistry::with_builtins(),
        TaskRegistry::from_platform_file(&file),
    );

    let mut platform = if file.is_composed() {
        let mut platform = ComposedPlatform::new(
            settings,
            Some(file.distrib()),
            Some(file.platform()),
            file.template.as_deref(),
            backends,
        )?;
        for declaration in file.images.iter() {
            platform.add_image(&declaration.name, &declaration.options)?;
        }
        *platform.deployer_mut() = deployer;
        Platform::Composed(platform)
    } else {
        let mut platform = SimplePlatform::new(
            &settings,
            Some(file.distrib()),
            Some(file.platform()),
            file.image.as_deref(),
            file.container.as_deref(),
            &file.options(),
            backends,
        )?;
        *platform.deployer_mut() = deployer;
        Platform::Simple(platform)
    };
    info!("loaded platform {}", file.platform());

    match opt.cmd {
        Cmd::Yaml => match &mut platform {
            Platform::Composed(platform) => {
                let path = platform.create_yaml()?;
                print_info(&mut stdout, &format!("wrote {}", path.display()))?;
            }
            Platform::Simple(_) => {
                return Err(anyhow!("a single container platform has no compose file"))
            }
        },
        Cmd::Build => step(&mut stdout, "Building images", || match &mut platform {
            Platform::Simple(platform) => platform.build(),
            Platform::Composed(platform) => platform.build(),
        })?,
        Cmd::Up => step(&mut stdout, "Starting platform", || match &mut platform {
            Platform::Simple(platform) => {
                platform.create()?;
                platform.start()
            }
            Platform::Composed(platform) => platform.up(),
        })?,
        Cmd::Create => step(&mut stdout, "Creating containers", || match &mut platform {
            Platform::Simple(platform) => platform.create(),
            Platform::Composed(platform) => platform.create_containers(),
        })?,
        Cmd::Start { engine } => {
            attach(&mut platform)?;
            step(&mut stdout, "Starting containers", || match &mut platform {
                Platform::Simple(platform) => platform.start(),
                Platform::Composed(platform) => platform.start(!engine),
            })?
        }
        Cmd::Stop => {
            attach(&mut platform)?;
            step(&mut stdout, "Stopping containers", || match &mut platform {
                Platform::Simple(platform) => platform.stop(),
                Platform::Composed(platform) => platform.stop(),
            })?
        }
        Cmd::Rm => {
            attach(&mut platform)?;
            step(&mut stdout, "Removing containers", || match &mut platform {
                Platform::Simple(platform) => platform.remove(),
                Platform::Composed(platform) => platform.rm(),
            })?
        }
        Cmd::Destroy => step(&mut stdout, "Removing images", || match &mut platform {
            Platform::Simple(platform) => platform.destroy(),
            Platform::Composed(platform) => platform.destroy(),
        })?,
        Cmd::Commit { repo } => {
            if let (Platform::Composed(_), Some(_)) = (&platform, &repo) {
                print_info(&mut stdout, "--repo is ignored for composed platforms")?;
            }
            step(&mut stdout, "Committing containers", || match &mut platform {
                Platform::Simple(platform) => platform.commit(repo.as_deref()),
                Platform::Composed(platform) => platform.commit(),
            })?
        }
        Cmd::Run { cmd, hosts, sudo } => {
            attach(&mut platform)?;
            match &mut platform {
                Platform::Simple(platform) => {
                    platform.run(&cmd, sudo)?;
                    writeln!(stdout, "{}", platform.image().output().unwrap_or_default())?;
                }
                Platform::Composed(platform) => {
                    platform.run(&cmd, Target::Hosts(&hosts), sudo)?;
                    for (name, output) in platform.output() {
                        stdout
                            .queue(style::PrintStyledContent(format!("{}: ", name).bold()))?
                            .queue(style::Print(format!("{}\n", output)))?;
                    }
                    stdout.flush()?;
                }
            }
        }
        Cmd::Hosts => {
            attach(&mut platform)?;
            let hosts = match &mut platform {
                Platform::Simple(platform) => platform.get_host()?,
                Platform::Composed(platform) => platform.get_host()?,
            };
            match hosts {
                HostRef::Single(host) => writeln!(stdout, "{}", host)?,
                HostRef::Composed(hosts) => {
                    for (name, host) in hosts {
                        writeln!(stdout, "{} {}", name, host)?;
                    }
                }
            }
        }
        Cmd::Deploy { cmd, overrides } => {
            attach(&mut platform)?;
            let cmd = cmd.as_deref().unwrap_or(DEFAULT_COMMAND);
            let overrides = overrides.into_iter().collect::<Map<_, _>>();
            step(&mut stdout, &format!("Running {}", cmd), || match &mut platform {
                Platform::Simple(platform) => {
                    platform.set_platform()?;
                    platform.execute(cmd, &overrides)
                }
                Platform::Composed(platform) => {
                    platform.set_platform()?;
                    platform.execute(cmd, &overrides)
                }
            })?
        }
    }

    Ok(())
}

/// Finds the containers created by an earlier invocation.
fn attach(platform: &mut Platform) -> Result<()> {
    match platform {
        Platform::Simple(platform) => platform.set_container()?,
        Platform::Composed(platform) => platform.set_containers()?,
    }

    Ok(())
}

fn step<F>(stdout: &mut impl Write, label: &str, operation: F) -> Result<()>
where
    F: FnOnce() -> navitia_compose::Result<()>,
{
    stdout
        .queue(style::Print(format!("{} ... ", label)))?
        .flush()?;

    operation()?;

    stdout
        .queue(style::PrintStyledContent("done".green().bold()))?
        .queue(style::Print("\n"))?
        .flush()?;

    Ok(())
}

fn print_info(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
        .queue(style::Print(format!("{}\n", message)))?
        .flush()?;

    Ok(())
}
