//! Command line arguments

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "deskline", version, about = "Terminal view of the live support queue")]
pub struct Cli {
    /// Defaults to `watch`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the ticket list and reprint it on every change
    Watch,
    /// Print a conversation and mark it read
    Open {
        /// Ticket reference id
        ticket: String,
    },
    /// Send a reply through Zoho Desk
    Reply {
        /// Ticket reference id
        ticket: String,
        /// Channel to answer on (e.g. EMAIL, CHAT)
        channel: String,
        /// Message text; remaining words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Watch)
    }
}
