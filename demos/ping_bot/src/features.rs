//! The core feature module: liveness checks and error handling probes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tether::core::EmbedColors;
use tether::prelude::*;
use tracing::{debug, info, warn};

// ============================================================================
// Commands
// ============================================================================

/// `/ping`: replies with the server time.
pub struct PingCommand {
    colors: EmbedColors,
}

#[async_trait]
impl Command for PingCommand {
    fn data(&self) -> CommandSchema {
        CommandSchema::new("ping", "Ping the bot to check if it's alive")
    }

    async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
        debug!("Received ping command");

        let embed = Embed::new()
            .title("Pong! :3")
            .color(self.colors.info)
            .description(format!(
                "I am alive and well! Server time is <t:{}:f>.",
                Utc::now().timestamp()
            ));
        invocation
            .session
            .respond(&invocation.event, Reply::embed(embed).ephemeral())
            .await?;
        Ok(())
    }
}

/// `/error-test`: fails in a chosen way to exercise error reporting.
pub struct ErrorTestCommand {
    colors: EmbedColors,
}

#[async_trait]
impl Command for ErrorTestCommand {
    fn data(&self) -> CommandSchema {
        let ephemeral = || {
            OptionSchema::new(
                OptionKind::Boolean,
                "ephemeral",
                "Whether or not the reply should be ephemeral.",
            )
        };

        CommandSchema::new("error-test", "Development command for testing error handling")
            .permissions(permissions::ADMINISTRATOR)
            .option(OptionSchema::new(
                OptionKind::SubCommand,
                "no-reply",
                "Throws error before sending a reply.",
            ))
            .option(
                OptionSchema::new(
                    OptionKind::SubCommand,
                    "reply",
                    "Throws error after replying to interaction.",
                )
                .option(ephemeral()),
            )
            .option(OptionSchema::new(
                OptionKind::SubCommand,
                "panic",
                "Generates a panic in the bot after replying.",
            ))
    }

    async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
        let Some((subcommand, options)) = invocation.event.subcommand() else {
            return Err("error-test requires a sub-command".into());
        };

        match subcommand {
            "reply" => {
                let embed = Embed::new()
                    .title("Meow! :3")
                    .color(self.colors.result)
                    .description("This is a response! An error is about to occur after this.");
                let mut reply = Reply::embed(embed);
                if options.boolean_option_or("ephemeral", true) {
                    reply = reply.ephemeral();
                }
                invocation.session.respond(&invocation.event, reply).await?;
            }
            "panic" => {
                let embed = Embed::new()
                    .title("Welp this hurts!")
                    .color(self.colors.result)
                    .description("A panic is going to happen in my runtime in the next instants.");
                invocation
                    .session
                    .respond(&invocation.event, Reply::embed(embed).ephemeral())
                    .await?;
                panic!("This is a fake panic! Coming from error test command.");
            }
            _ => {}
        }

        Err("this is a made up error".into())
    }
}

// ============================================================================
// Events
// ============================================================================

/// Logs the bot identity and invite link once connected.
pub struct OnReadyEvent;

#[async_trait]
impl Event<Ready> for OnReadyEvent {
    fn data(&self) -> EventData {
        EventData::new("core-on-ready").once()
    }

    async fn execute(&self, invocation: Invocation<Ready>) -> Result<(), BoxError> {
        let ready = &invocation.event;
        info!("Logged in as {} ({})", ready.username, ready.user_id);

        if ready.guilds.is_empty() {
            warn!("Not connected to any guilds");
        } else {
            info!("Connected to guilds: {}", ready.guilds.join(", "));
        }

        info!(
            "Bot invite link: https://discord.com/oauth2/authorize?client_id={}&scope=bot&permissions={}",
            invocation.session.application_id(),
            permissions::ADMINISTRATOR
        );
        Ok(())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Logs once a minute.
pub struct HeartbeatTask {
    beats: Arc<AtomicU64>,
}

#[async_trait]
impl Task for HeartbeatTask {
    fn data(&self) -> TaskData {
        TaskData::new("heartbeat", "* * * * *")
    }

    async fn execute(&self, invocation: Invocation<Tick>) -> Result<(), BoxError> {
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            beats,
            scheduled_at = %invocation.event.scheduled_at,
            "Heartbeat"
        );
        Ok(())
    }
}

// ============================================================================
// Module
// ============================================================================

/// Groups the core handlers.
pub struct CoreModule {
    recover: RecoverMiddleware,
    colors: EmbedColors,
    beats: Arc<AtomicU64>,
}

impl CoreModule {
    pub fn new(config: &TetherConfig) -> Self {
        Self {
            recover: config.recover_middleware(),
            colors: config.colors,
            beats: Arc::default(),
        }
    }

    /// Number of heartbeats so far.
    pub fn beats(&self) -> Arc<AtomicU64> {
        self.beats.clone()
    }
}

impl Module for CoreModule {
    fn name(&self) -> &str {
        "core"
    }

    fn events(&self) -> Result<Vec<tether::framework::AnyEventStack>, BoxError> {
        Ok(vec![
            EventStack::<Ready>::new(OnReadyEvent)
                .with(LoggingMiddleware)
                .into(),
        ])
    }

    fn commands(&self) -> Result<Vec<CommandStack>, BoxError> {
        Ok(vec![
            CommandStack::new(PingCommand {
                colors: self.colors,
            })
            .with(LoggingMiddleware)
            .with(self.recover.clone()),
            CommandStack::new(ErrorTestCommand {
                colors: self.colors,
            })
            .with(LoggingMiddleware)
            .with(self.recover.clone())
            .with(PermissionMiddleware::new()),
        ])
    }

    fn tasks(&self) -> Result<Vec<TaskStack>, BoxError> {
        Ok(vec![
            TaskStack::new(HeartbeatTask {
                beats: self.beats.clone(),
            })
            .with(LoggingMiddleware),
        ])
    }
}
