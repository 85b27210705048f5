//! Task runner.
//!
//! Tasks are a fixed, flat set with static dependencies:
//!
//! ```text
//! default ──┬── media            ftp  ── config
//!           ├── scripts          sync ── config
//!           ├── styles
//!           └── html             watch (starts sync with --sync, reruns default)
//! ```
//!
//! Before anything executes the requested task is resolved into a
//! [`sequence`]: dependencies first, every task once. The sequence is part of
//! the run's observable state. It decides which config sections are prompted
//! and whether build tasks raise their own "task complete" notification or
//! leave it to `default`'s summary.

use crate::config::{ConfigError, ConfigRequest, LocalConfig, Prompter, configure};
use crate::imaging::ImageCompressor;
use crate::notifier::{Notification, Notifier};
use crate::output;
use crate::server::{DevServer, ServerError, ServerOptions};
use crate::tasks::ftp::Connector;
use crate::tasks::{self, TaskContext, TaskError, TaskReport};
use crate::watch::{self, WatchError};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskName {
    Media,
    Scripts,
    Styles,
    Html,
    Config,
    Ftp,
    Sync,
    Default,
    Watch,
}

/// The four tasks `default` builds.
const BUILD_TASKS: [TaskName; 4] = [
    TaskName::Media,
    TaskName::Scripts,
    TaskName::Styles,
    TaskName::Html,
];

impl TaskName {
    pub fn dependencies(self) -> &'static [TaskName] {
        match self {
            TaskName::Ftp | TaskName::Sync => &[TaskName::Config],
            TaskName::Default => &BUILD_TASKS,
            _ => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskName::Media => "media",
            TaskName::Scripts => "scripts",
            TaskName::Styles => "styles",
            TaskName::Html => "html",
            TaskName::Config => "config",
            TaskName::Ftp => "ftp",
            TaskName::Sync => "sync",
            TaskName::Default => "default",
            TaskName::Watch => "watch",
        }
    }

    /// Name as used in notifications ("Media task complete!").
    pub fn label(self) -> &'static str {
        match self {
            TaskName::Media => "Media",
            TaskName::Scripts => "Scripts",
            TaskName::Styles => "Styles",
            TaskName::Html => "HTML",
            TaskName::Config => "Config",
            TaskName::Ftp => "FTP",
            TaskName::Sync => "Sync",
            TaskName::Default => "Default",
            TaskName::Watch => "Watch",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dependencies first, each task once.
pub fn sequence(task: TaskName) -> Vec<TaskName> {
    fn visit(task: TaskName, out: &mut Vec<TaskName>) {
        for dep in task.dependencies() {
            visit(*dep, out);
        }
        if !out.contains(&task) {
            out.push(task);
        }
    }
    let mut out = Vec::new();
    visit(task, &mut out);
    out
}

/// Global command-line switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub dist: bool,
    pub ftp: bool,
    pub sync: bool,
    pub config: bool,
    pub all: bool,
}

/// Collaborators that talk to the outside world.
pub struct Services<'a> {
    pub notifier: Arc<dyn Notifier>,
    pub prompter: &'a dyn Prompter,
    pub compressor: &'a dyn ImageCompressor,
    pub connector: &'a dyn Connector,
}

pub struct Runner<'a> {
    ctx: TaskContext,
    flags: Flags,
    services: Services<'a>,
    sequence: Vec<TaskName>,
    started: Mutex<HashSet<TaskName>>,
    ran: Mutex<Vec<TaskName>>,
    config: OnceLock<LocalConfig>,
    server: OnceLock<DevServer>,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: TaskContext, flags: Flags, services: Services<'a>, task: TaskName) -> Self {
        Self {
            ctx,
            flags,
            services,
            sequence: sequence(task),
            started: Mutex::new(HashSet::new()),
            ran: Mutex::new(Vec::new()),
            config: OnceLock::new(),
            server: OnceLock::new(),
        }
    }

    pub fn sequence(&self) -> &[TaskName] {
        &self.sequence
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Tasks that wrote output since the last `default` summary.
    pub fn ran_tasks(&self) -> Vec<TaskName> {
        let mut ran = self.ran.lock().unwrap_or_else(|e| e.into_inner()).clone();
        ran.sort();
        ran
    }

    /// Run the requested task with its dependencies.
    pub fn run(&self) -> Result<(), RunError> {
        let Some(&task) = self.sequence.last() else {
            return Ok(());
        };
        tracing::debug!(sequence = ?self.sequence, target = %self.ctx.target, "running");
        self.ensure(task)
    }

    fn in_sequence(&self, task: TaskName) -> bool {
        self.sequence.contains(&task)
    }

    /// Build tasks leave their notification to `default`'s summary when one
    /// will follow (watch reruns `default`).
    fn summarized(&self) -> bool {
        self.in_sequence(TaskName::Default) || self.in_sequence(TaskName::Watch)
    }

    /// Run `task` (dependencies first) unless it already started.
    fn ensure(&self, task: TaskName) -> Result<(), RunError> {
        let first = self
            .started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task);
        if !first {
            return Ok(());
        }
        if task == TaskName::Default {
            self.build_all(|t| self.ensure(t))?;
        } else {
            for dep in task.dependencies() {
                self.ensure(*dep)?;
            }
        }
        self.execute(task)
    }

    /// Run the four build tasks concurrently. Any failure fails the batch.
    fn build_all<F>(&self, run: F) -> Result<(), RunError>
    where
        F: Fn(TaskName) -> Result<(), RunError> + Sync,
    {
        let results: Mutex<Vec<RunError>> = Mutex::new(Vec::new());
        rayon::scope(|s| {
            for task in BUILD_TASKS {
                let run = &run;
                let results = &results;
                s.spawn(move |_| {
                    if let Err(e) = run(task) {
                        results.lock().unwrap_or_else(|e| e.into_inner()).push(e);
                    }
                });
            }
        });
        match results.into_inner().unwrap_or_else(|e| e.into_inner()).pop() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn execute(&self, task: TaskName) -> Result<(), RunError> {
        tracing::debug!(%task, "task start");
        match task {
            TaskName::Media => self.finish_build(
                task,
                tasks::media::run(&self.ctx, self.services.compressor)?,
            ),
            TaskName::Scripts => self.finish_build(task, tasks::scripts::run(&self.ctx)?),
            TaskName::Styles => self.finish_build(task, tasks::styles::run(&self.ctx)?),
            TaskName::Html => self.finish_build(task, tasks::html::run(&self.ctx)?),
            TaskName::Config => {
                self.configure()?;
            }
            TaskName::Ftp => self.deploy()?,
            TaskName::Sync => self.serve()?,
            TaskName::Default => self.summarize()?,
            TaskName::Watch => return self.watch(),
        }
        Ok(())
    }

    fn notify(&self, message: String) {
        self.services.notifier.notify(&Notification::success(message));
    }

    fn finish_build(&self, task: TaskName, report: TaskReport) {
        output::print_task_report(task, self.ctx.target, self.ctx.output(), &report);
        if !report.ran() {
            return;
        }
        {
            let mut ran = self.ran.lock().unwrap_or_else(|e| e.into_inner());
            if !ran.contains(&task) {
                ran.push(task);
            }
        }
        if !self.summarized() {
            self.notify(format!("{} task complete!", task.label()));
        }
    }

    fn configure(&self) -> Result<&LocalConfig, RunError> {
        let request = ConfigRequest {
            ftp_requested: self.in_sequence(TaskName::Ftp) || self.flags.ftp,
            sync_requested: self.in_sequence(TaskName::Sync) || self.flags.sync,
            force: self.flags.config,
            all: self.flags.all,
        };
        let config = configure(
            self.ctx.layout.config_file(),
            self.ctx.target,
            request,
            self.services.prompter,
        )?;
        Ok(self.config.get_or_init(|| config))
    }

    fn local_config(&self) -> Result<&LocalConfig, RunError> {
        match self.config.get() {
            Some(config) => Ok(config),
            None => self.configure(),
        }
    }

    fn deploy(&self) -> Result<(), RunError> {
        let credentials = self.local_config()?.ftp.for_target(self.ctx.target).clone();
        let report = tasks::ftp::run(&self.ctx, &credentials, self.services.connector)?;
        output::print_task_report(TaskName::Ftp, self.ctx.target, self.ctx.output(), &report);
        if report.ran() {
            self.notify(format!("{} task complete!", TaskName::Ftp.label()));
        }
        Ok(())
    }

    fn serve(&self) -> Result<(), RunError> {
        if self.server.get().is_some() {
            return Ok(());
        }
        let settings = self.local_config()?.browsersync.clone();
        let options = ServerOptions::from_settings(self.ctx.output(), &settings)?;
        let server = DevServer::start(options)?;
        self.ctx.attach_reloader(server.reloader.clone());
        output::print_server_started(server.address);
        if self.server.set(server).is_err() {
            tracing::debug!("dev server already running");
        }
        Ok(())
    }

    fn summarize(&self) -> Result<(), RunError> {
        let ran = self.ran_tasks();
        if !ran.is_empty() {
            let names: Vec<&str> = ran.iter().map(|t| t.name()).collect();
            self.notify(format!("Task(s) complete! [{}]", names.join(", ")));
        }
        if self.flags.ftp {
            self.deploy()?;
        }
        self.ran.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    /// Rebuild everything once, as a change batch does.
    pub fn rebuild(&self) -> Result<(), RunError> {
        self.build_all(|t| self.execute(t))?;
        self.summarize()
    }

    fn watch(&self) -> Result<(), RunError> {
        if self.flags.sync {
            self.ensure(TaskName::Sync)?;
        }
        let src = self.ctx.layout.src();
        let package = self.ctx.layout.package_file();
        let mut roots = vec![src];
        if package.is_file() {
            roots.push(package);
        }
        let debounce = Duration::from_millis(self.ctx.settings.watch.debounce_ms);

        watch::watch(&roots, debounce, |changed| {
            output::print_changes(self.ctx.layout.root(), changed);
            if let Err(e) = self.rebuild() {
                self.ctx.errors.report(&e);
            }
        })?;
        Ok(())
    }
}
