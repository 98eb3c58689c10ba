//! Engine bootstrap.
//!
//! [`TetherRuntime`] owns the three registries and drives the module
//! aggregator through its publish phases in a fixed order: events first so
//! no notification is missed, then commands, then tasks (unless the
//! scheduler is disabled).
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().load()?;
//! let runtime = TetherRuntime::builder()
//!     .module(CoreModule::new(&config))
//!     .config(config)
//!     .build(session)?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};

use tether_core::SharedSession;
use tether_framework::{CommandManager, EventManager, Module, ModuleManager, Scheduler, TaskManager};

use crate::config::{ConfigLoader, TetherConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The bootstrapped engine.
pub struct TetherRuntime {
    config: TetherConfig,
    session: SharedSession,
    modules: ModuleManager,
    events: EventManager,
    commands: CommandManager,
    tasks: TaskManager,
    started: bool,
}

impl TetherRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn commands(&self) -> &CommandManager {
        &self.commands
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Registers and publishes every module's events, commands and tasks.
    ///
    /// Any error is fatal: the runtime should not be used afterwards.
    pub async fn start(&mut self) -> RuntimeResult<()> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.started = true;

        info!(
            application_id = %self.session.application_id(),
            modules = ?self.modules.module_names(),
            "Starting Tether runtime"
        );

        self.modules
            .on_events(self.session.clone(), &mut self.events)
            .await?;
        self.modules
            .on_commands(self.session.clone(), &mut self.commands)
            .await?;

        if self.config.scheduler.enabled {
            self.modules
                .on_tasks(self.session.clone(), &mut self.tasks)
                .await?;
        } else {
            info!("Scheduler disabled, skipping tasks");
        }

        info!(
            events = self.events.len(),
            commands = self.commands.len(),
            tasks = self.tasks.len(),
            "Runtime started"
        );
        Ok(())
    }

    /// Stops the scheduler. Bound commands and events stay bound.
    pub fn shutdown(&self) {
        self.tasks.scheduler().shutdown();
        info!("Runtime stopped");
    }

    /// Starts the runtime and blocks until Ctrl+C or SIGTERM.
    pub async fn run(self) -> RuntimeResult<()> {
        self.run_until_signal(wait_for_signal()).await
    }

    /// Starts the runtime and blocks until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.run_until_signal(async {
            shutdown.await;
            Ok(())
        })
        .await
    }

    async fn run_until_signal<F>(mut self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = RuntimeResult<()>>,
    {
        self.start().await?;
        info!("Tether runtime is now running");

        let result = signal.await;
        self.shutdown();
        result
    }
}

impl std::fmt::Debug for TetherRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherRuntime")
            .field("application_id", &self.session.application_id())
            .field("modules", &self.modules)
            .field("started", &self.started)
            .finish()
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_signal() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`TetherRuntime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<TetherConfig>,
    modules: Vec<Arc<dyn Module>>,
    scheduler: Option<Arc<Scheduler>>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            modules: Vec::new(),
            scheduler: None,
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges a programmatic configuration below files and environment.
    pub fn merge(mut self, config: TetherConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Uses an already loaded configuration instead of loading one.
    pub fn config(mut self, config: TetherConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = Arc<dyn Module>>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Feeds tasks into an existing scheduler.
    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Leaves the global subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads and validates the configuration, installs logging and assembles
    /// the runtime around `session`.
    pub fn build(self, session: SharedSession) -> RuntimeResult<TetherRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        if session.application_id() != config.bot.application_id {
            warn!(
                configured = %config.bot.application_id,
                session = %session.application_id(),
                "Session application ID differs from configuration"
            );
        }

        let mut modules = ModuleManager::new();
        modules.register_modules(self.modules);

        let tasks = match self.scheduler {
            Some(scheduler) => TaskManager::with_scheduler(scheduler),
            None => TaskManager::new(),
        };

        Ok(TetherRuntime {
            config,
            session,
            modules,
            events: EventManager::new(),
            commands: CommandManager::new(),
            tasks,
            started: false,
        })
    }
}
