//! Ping bot demo.
//!
//! Runs the core module against an in-memory session and plays a handful of
//! deliveries through it: the ready notification, `/ping` and each flavor of
//! `/error-test`.
//!
//! ```bash
//! cargo run -p ping-bot -- --once
//! TETHER_LOGGING__LEVEL=debug cargo run -p ping-bot
//! ```

mod features;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use tether::core::{InteractionOption, MemorySession, OptionValue, permissions};
use tether::prelude::*;
use tracing::{info, warn};

use crate::features::CoreModule;

const APPLICATION_ID: &str = "1000000000000000001";
const OWNER_ID: &str = "2000000000000000002";

#[derive(Debug, Parser)]
#[command(name = "ping-bot", about = "Runs the core module against an in-memory session")]
struct Cli {
    /// Configuration file to load on top of the defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `development`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Exit after the simulated deliveries instead of waiting for Ctrl+C.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut defaults = TetherConfig::default();
    defaults.bot.application_id = APPLICATION_ID.into();

    let mut loader = ConfigLoader::new().with_current_dir().merge(defaults);
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    let session = MemorySession::new(config.bot.application_id.clone());
    // Left over from an earlier deployment; the first publish removes it.
    session.seed_command("stale-command");

    let core = CoreModule::new(&config);
    let beats = core.beats();
    let mut runtime = TetherRuntime::builder()
        .config(config)
        .module(core)
        .build(session.clone())?;

    runtime.start().await?;
    info!(commands = ?session.remote_names(), "Commands published");

    simulate(&session).await;

    for recorded in session.replies() {
        let title = recorded
            .reply
            .embeds
            .first()
            .and_then(|embed| embed.title.as_deref())
            .unwrap_or("<no embed>");
        info!(
            command = %recorded.command_name,
            interaction = %recorded.interaction_id,
            ephemeral = recorded.reply.ephemeral,
            attachments = recorded.reply.attachments.len(),
            "Replied: {title}"
        );
    }

    if !cli.once {
        info!("Waiting for Ctrl+C");
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
        }
    }

    runtime.shutdown();
    info!(heartbeats = beats.load(Ordering::Relaxed), "Stopped");
    Ok(())
}

/// Plays the deliveries a connected session would produce.
async fn simulate(session: &Arc<MemorySession>) {
    session
        .notify(Ready {
            user_id: APPLICATION_ID.into(),
            username: "ping-bot".into(),
            guilds: vec!["3000000000000000003".into()],
        })
        .await;

    session
        .deliver(Interaction::new("1", "ping").with_user(OWNER_ID))
        .await;

    let error_test = |id: &str| {
        Interaction::new(id, "error-test")
            .with_user(OWNER_ID)
            .with_guild("3000000000000000003")
    };

    session
        .deliver(
            error_test("2")
                .with_permissions(permissions::ADMINISTRATOR)
                .with_option(InteractionOption::new(
                    "reply",
                    OptionValue::SubCommand(vec![InteractionOption::new(
                        "ephemeral",
                        OptionValue::Boolean(false),
                    )]),
                )),
        )
        .await;

    session
        .deliver(
            error_test("3")
                .with_permissions(permissions::ADMINISTRATOR)
                .with_option(InteractionOption::new(
                    "panic",
                    OptionValue::SubCommand(Vec::new()),
                )),
        )
        .await;

    // Lacks ADMINISTRATOR, so the permission check rejects it.
    session
        .deliver(
            error_test("4")
                .with_permissions(0)
                .with_option(InteractionOption::new(
                    "no-reply",
                    OptionValue::SubCommand(Vec::new()),
                )),
        )
        .await;
}
