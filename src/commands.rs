//! Commands accepted from the command source, and their execution.
//!
//! A command line is `name [args...]`. Execution acts on the subscription
//! store, the poller's refresh signal, or the output sink. None of it waits
//! on an in-progress cycle.
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::poller::RefreshHandle;
use crate::sink::{is_missing_buffer, OutputSink, SinkError};
use crate::subscriptions::{StoreError, SubscriptionStore};
use crate::util::{validate_url, UrlValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Refresh,
    /// Reserved for opening a feed as a document; currently does nothing.
    Open(String),
    Close(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0} not supported")]
    NotSupported(String),

    #[error("Usage: {0}")]
    MissingArgument(&'static str),

    #[error("Empty command")]
    Empty,

    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No such buffer: {0}")]
    NoSuchBuffer(String),

    #[error(transparent)]
    Sink(SinkError),
}

impl Command {
    /// Every command name with its usage, as listed by [`Command::help`].
    pub const USAGE: [(&'static str, &'static str); 5] = [
        ("subscribe", "subscribe <url>"),
        ("unsubscribe", "unsubscribe <url>"),
        ("refresh", "refresh"),
        ("open", "open <url>"),
        ("close", "close <name>"),
    ];

    /// Multi-line command summary shown after an unknown command.
    pub fn help() -> String {
        let mut help = String::from("Commands:\n");
        for (_, usage) in Self::USAGE {
            help.push_str("  ");
            help.push_str(usage);
            help.push('\n');
        }
        help
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Refresh => "refresh",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(CommandError::Empty)?;
        let mut arg = |usage: &'static str| {
            parts
                .next()
                .map(str::to_owned)
                .ok_or(CommandError::MissingArgument(usage))
        };

        match name {
            "subscribe" => Ok(Self::Subscribe(arg("subscribe <url>")?)),
            "unsubscribe" => Ok(Self::Unsubscribe(arg("unsubscribe <url>")?)),
            "refresh" => Ok(Self::Refresh),
            "open" => Ok(Self::Open(arg("open <url>")?)),
            "close" => Ok(Self::Close(arg("close <name>")?)),
            other => Err(CommandError::NotSupported(other.to_string())),
        }
    }
}

/// Executes commands against the shared collaborators.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<SubscriptionStore>,
    refresh: RefreshHandle,
    sink: Arc<dyn OutputSink>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        refresh: RefreshHandle,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            store,
            refresh,
            sink,
        }
    }

    /// Parses and executes one command line.
    pub async fn execute_line(&self, line: &str) -> Result<(), CommandError> {
        self.execute(line.parse()?).await
    }

    pub async fn execute(&self, command: Command) -> Result<(), CommandError> {
        tracing::debug!(command = command.name(), "Executing command");

        match command {
            Command::Subscribe(url) => {
                validate_url(&url)?;
                self.store.add(&url).await?;
            }
            Command::Unsubscribe(url) => {
                if self.store.remove(&url).await? == 0 {
                    tracing::info!(url = %url, "Not subscribed, nothing removed");
                }
            }
            Command::Refresh => {
                self.refresh.refresh();
            }
            Command::Open(url) => {
                tracing::debug!(url = %url, "open has no document view, ignoring");
            }
            Command::Close(name) => {
                self.sink.close_buffer(&name).map_err(|e| {
                    if is_missing_buffer(&e) {
                        CommandError::NoSuchBuffer(name.clone())
                    } else {
                        CommandError::Sink(e)
                    }
                })?;
            }
        }
        Ok(())
    }
}
