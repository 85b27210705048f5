use clap::{Parser, Subcommand};
use sitepipe::config::TerminalPrompter;
use sitepipe::imaging::RustCompressor;
use sitepipe::notifier::{DesktopNotifier, ErrorHandler, LogNotifier, Notifier};
use sitepipe::project::ProjectMeta;
use sitepipe::runner::{Flags, Runner, Services, TaskName};
use sitepipe::settings::{self, ProcessingConfig};
use sitepipe::target::{Layout, Target};
use sitepipe::tasks::TaskContext;
use sitepipe::tasks::ftp::FtpConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("SITEPIPE_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("SITEPIPE_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Front-end build pipeline: media, scripts, styles, HTML, dev server, FTP")]
#[command(long_about = "\
Front-end build pipeline: media, scripts, styles, HTML, dev server, FTP

Builds ./src into ./dev (default) or ./dist (--dist).

Project structure:

  src/
  ├── assets/
  │   ├── media/                 # Images are compressed, everything else copied
  │   ├── scripts/
  │   │   ├── vendor/            # → vendor.js (concatenated, not transpiled)
  │   │   ├── critical/          # → critical.js
  │   │   ├── legacy/            # → legacy.js
  │   │   └── *.js               # → modern.js (linted)
  │   └── styles/
  │       ├── _partial.scss      # Partials are only imported
  │       └── modern.scss        # → modern.css
  ├── partials/                  # @@include targets
  ├── screenshot.png
  └── index.html                 # @@include(\"partials/head.html\"), @@name, @@version...
  package.json                   # Template variables
  config.json                    # FTP + dev server settings (prompted, keep out of VCS)
  sitepipe.toml                  # Optional build settings

Tasks:
  default   media + scripts + styles + html (+ ftp with --ftp)
  watch     rebuild on change (+ dev server with --sync)
  sync      dev server with live reload
  ftp       upload the current target
  config    create / update config.json

Run 'sitepipe gen-config' to print a documented sitepipe.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Build the production target (./dist)
    #[arg(long, global = true)]
    dist: bool,

    /// Upload after the default task
    #[arg(long, global = true)]
    ftp: bool,

    /// Start the dev server while watching
    #[arg(long, global = true)]
    sync: bool,

    /// Re-prompt configuration for the sections in use
    #[arg(long, global = true)]
    config: bool,

    /// Prompt every configuration section
    #[arg(long, global = true)]
    all: bool,

    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log only, no desktop notifications
    #[arg(long, global = true)]
    quiet: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Task to run (default: `default`)
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Compress images and copy media
    Media,
    /// Lint and bundle JavaScript
    Scripts,
    /// Compile SCSS to prefixed CSS
    Styles,
    /// Template and copy pages
    Html,
    /// Create or update config.json
    Config,
    /// Upload the current target over FTP
    Ftp,
    /// Serve the current target with live reload
    Sync,
    /// Build media, scripts, styles and html
    Default,
    /// Rebuild on every change under src/
    Watch,
    /// Print a stock sitepipe.toml with all options documented
    GenConfig,
}

impl Command {
    fn task(self) -> Option<TaskName> {
        Some(match self {
            Command::Media => TaskName::Media,
            Command::Scripts => TaskName::Scripts,
            Command::Styles => TaskName::Styles,
            Command::Html => TaskName::Html,
            Command::Config => TaskName::Config,
            Command::Ftp => TaskName::Ftp,
            Command::Sync => TaskName::Sync,
            Command::Default => TaskName::Default,
            Command::Watch => TaskName::Watch,
            Command::GenConfig => return None,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(task) = cli.command.map_or(Some(TaskName::Default), Command::task) else {
        print!("{}", settings::stock_settings_toml());
        return Ok(());
    };

    init_tracing(cli.verbose);

    let build_settings = settings::load_settings(&cli.root)?;
    init_thread_pool(&build_settings.processing);

    let target = Target::from_flag(cli.dist);
    let layout = Layout::new(&cli.root, &build_settings.paths);
    let project = ProjectMeta::load(layout.package_file());

    let notifier: Arc<dyn Notifier> = if cli.quiet {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier)
    };
    let ctx = TaskContext::new(
        layout,
        target,
        build_settings,
        project,
        ErrorHandler::new(notifier.clone()),
    );

    let flags = Flags {
        dist: cli.dist,
        ftp: cli.ftp,
        sync: cli.sync,
        config: cli.config,
        all: cli.all,
    };
    let compressor = RustCompressor::new();
    let services = Services {
        notifier,
        prompter: &TerminalPrompter,
        compressor: &compressor,
        connector: &FtpConnector,
    };

    let runner = Runner::new(ctx, flags, services, task);
    runner.run()?;

    // A dev server started without watch keeps serving until interrupted.
    if task == TaskName::Sync {
        tracing::info!("press Ctrl-C to stop");
        loop {
            std::thread::park();
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "sitepipe=info",
        1 => "sitepipe=debug",
        _ => "sitepipe=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing settings.
///
/// Caps at the number of available CPU cores. Users can constrain down, not up.
fn init_thread_pool(processing: &ProcessingConfig) {
    let threads = settings::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
