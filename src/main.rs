//! Mount a filesystem whose files are the output of the commands naming them.
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error};

mod app_config;
mod daemon;
mod fs;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "A filesystem where file paths are shell commands and file contents are their output."
)]
struct Args {
    /// Where to mount the filesystem. Overrides the config file.
    mount_point: Option<PathBuf>,

    #[arg(short, long, value_parser, help = "Optional path to a config TOML.")]
    config_path: Option<PathBuf>,

    /// Stay in the foreground instead of daemonizing.
    #[arg(short, long)]
    foreground: bool,

    /// Report placeholder attributes for unknown paths so stat-before-open
    /// callers (tab completion) do not trigger command execution.
    #[arg(short = 'u', long = "unsafe")]
    unsafe_attrs: bool,

    /// Diagnostic mode: files contain their own command text, nothing is
    /// executed.
    #[arg(short, long)]
    echo: bool,

    /// Working directory for command execution.
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Name of the caching subtree directory.
    #[arg(long)]
    cache_dir: Option<String>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(mount_point) = &self.mount_point {
            config.mount_point.clone_from(mount_point);
        }
        if let Some(workdir) = &self.workdir {
            config.workdir = Some(workdir.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir.clone_from(cache_dir);
        }
        config.unsafe_attrs |= self.unsafe_attrs;
        config.echo |= self.echo;
    }
}

fn main() {
    let args = Args::parse();

    // Load config first; errors use eprintln since tracing isn't up yet.
    let mut config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    args.apply(&mut config);
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    let trc = if args.foreground {
        Trc::default().with_verbosity(args.verbose)
    } else {
        Trc::default().with_verbosity(args.verbose).for_daemon()
    };
    trc.init().unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    });

    if args.foreground {
        if let Err(e) = daemon::run(config) {
            error!("Filesystem failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    debug!(config = ?config, "Initializing daemon with configuration...");
    let pid_file_parent = match config.pid_file.parent() {
        Some(parent) => parent,
        None => {
            // validate() guarantees a parent; treat absence as a bug.
            error!("PID file has no parent directory.");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(pid_file_parent) {
        error!("Failed to create PID file directory: {e}");
        std::process::exit(1);
    }

    let daemonize = daemonize::Daemonize::new()
        .pid_file(&config.pid_file)
        .working_directory("/");

    match daemonize.start() {
        Ok(()) => {
            if let Err(e) = daemon::run(config) {
                error!("Daemon failed: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Failed to spawn the daemon: {e}");
            std::process::exit(1);
        }
    }
}
