//! Operator console: `!command` lines from stdin mapped onto engine operations.
//!
//! Lines are read on a plain thread and forwarded to the runtime, so a blocked read
//! never holds up shutdown. Every line runs as the operator [`Caller`].

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use hourbell_common::config::RuntimeConfig;
use hourbell_common::types::{ChannelId, SubscriptionType, UserId};
use hourbell_engine::renderer;
use hourbell_engine::{AdminService, SubscriptionStore};

use crate::auth::{Caller, RoleAuthorizer};

const HELP: &str = "Commands: !toggle <user_id> <minute_5_before|minute_3_before|on_time|all>, \
!set_channel <id>, !set_debug_channel <id>, !set_retention <seconds>, !test_alert, !status, !help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Toggle { user_id: UserId, kind: SubscriptionType },
    SetChannel(ChannelId),
    SetDebugChannel(ChannelId),
    SetRetention(i64),
    TestAlert,
    Status,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("invalid {name} `{value}`")]
    InvalidArgument { name: &'static str, value: String },
}

fn argument<'a>(args: &mut impl Iterator<Item = &'a str>, name: &'static str) -> Result<&'a str, CommandError> {
    args.next().ok_or(CommandError::MissingArgument(name))
}

fn number<T: FromStr>(raw: &str, name: &'static str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| CommandError::InvalidArgument {
        name,
        value: raw.to_string(),
    })
}

fn parse_kind(raw: &str) -> Result<SubscriptionType, CommandError> {
    SubscriptionType::ALL_KINDS
        .into_iter()
        .find(|kind| kind.to_string() == raw)
        .ok_or_else(|| CommandError::InvalidArgument {
            name: "kind",
            value: raw.to_string(),
        })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();

        match name.strip_prefix('!').unwrap_or(name) {
            "toggle" => {
                let user_id = number(argument(&mut words, "user_id")?, "user_id")?;
                let kind = parse_kind(argument(&mut words, "kind")?)?;
                Ok(Command::Toggle {
                    user_id: UserId(user_id),
                    kind,
                })
            }
            "set_channel" => Ok(Command::SetChannel(ChannelId(number(
                argument(&mut words, "id")?,
                "channel id",
            )?))),
            "set_debug_channel" => Ok(Command::SetDebugChannel(ChannelId(number(
                argument(&mut words, "id")?,
                "channel id",
            )?))),
            "set_retention" => Ok(Command::SetRetention(number(
                argument(&mut words, "seconds")?,
                "seconds",
            )?)),
            "test_alert" => Ok(Command::TestAlert),
            "status" => Ok(Command::Status),
            "help" => Ok(Command::Help),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Executes parsed commands and renders the reply text.
pub struct CommandHandler {
    admin: AdminService<RoleAuthorizer>,
    store: Arc<SubscriptionStore>,
    config: Arc<RuntimeConfig>,
}

impl CommandHandler {
    pub fn new(
        admin: AdminService<RoleAuthorizer>,
        store: Arc<SubscriptionStore>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self { admin, store, config }
    }

    /// Parse and run one line. Blank lines produce no reply.
    pub async fn handle_line(&self, caller: &Caller, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match line.parse::<Command>() {
            Ok(command) => Some(self.execute(caller, command).await),
            Err(e) => Some(format!("❌ {e}. {HELP}")),
        }
    }

    pub async fn execute(&self, caller: &Caller, command: Command) -> String {
        let result = match command {
            Command::Toggle { user_id, kind } => {
                let (_, reply) = self
                    .store
                    .toggle_with(user_id, kind, renderer::render_toggle_reply)
                    .await;
                return reply;
            }
            Command::SetChannel(id) => self
                .admin
                .set_active_channel(caller, id)
                .await
                .map(|()| format!("✅ Alerts now go to channel {id}.")),
            Command::SetDebugChannel(id) => self
                .admin
                .set_debug_channel(caller, id)
                .await
                .map(|()| format!("✅ Diagnostics now go to channel {id}.")),
            Command::SetRetention(seconds) => self
                .admin
                .set_retention_seconds(caller, seconds)
                .map(|()| format!("✅ Alerts are now removed after {seconds}s.")),
            Command::TestAlert => self.admin.test_alert(caller),
            Command::Status => Ok(self.status()),
            Command::Help => Ok(HELP.to_string()),
        };

        result.unwrap_or_else(|e| format!("❌ {e}"))
    }

    fn status(&self) -> String {
        let snapshot = self.store.snapshot();
        let counts = SubscriptionType::ALL_KINDS
            .iter()
            .map(|kind| format!("{kind}={}", snapshot.members(*kind).len()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Alert channel: {}, debug channel: {}, retention: {}s, subscribers: {counts}",
            self.config.active_channel(),
            self.config.debug_channel(),
            self.config.retention_seconds(),
        )
    }
}

/// Serve stdin until it closes or `shutdown` flips to `true`.
pub async fn run_console(handler: Arc<CommandHandler>, caller: Caller, mut shutdown: watch::Receiver<bool>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                return;
            }
        }
    });

    println!("Hourbell console. {HELP}");

    loop {
        tokio::select! {
            biased;
            _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => break,
            line = rx.recv() => {
                let Some(line) = line else {
                    tracing::info!("Console input closed");
                    break;
                };
                if let Some(reply) = handler.handle_line(&caller, &line).await {
                    println!("{reply}");
                }
            }
        }
    }
}
