//! Interactive command implementations.
//!
//! Each line typed at the prompt is split on whitespace and parsed with clap
//! as a [`CommandLine`], so the commands get the same argument validation and
//! help output as the process flags.

pub mod devices;
pub mod routes;

use crate::session::Session;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use patchbay_core::RouteId;

/// What the prompt loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next command.
    Continue,
    /// Leave the loop and shut down.
    Exit,
}

#[derive(Parser, Debug)]
#[command(
    name = "command",
    no_binary_name = true,
    disable_version_flag = true,
    override_usage = "<COMMAND> [ARGS]"
)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List all audio devices
    List,

    /// Create a new route
    Create {
        /// Position in the input device list
        input: usize,
        /// Position in the output device list
        output: usize,
        /// Sample rate in Hz (defaults to the configured rate)
        sample_rate: Option<u32>,
    },

    /// Stop a specific route
    Stop {
        /// Route identifier shown by `create` and `routes`
        route_id: RouteId,
    },

    /// List all active routes
    Routes,

    /// Exit the program
    #[command(visible_alias = "quit")]
    Exit,
}

/// Result of parsing one prompt line.
#[derive(Debug)]
pub enum Parsed {
    /// Nothing but whitespace.
    Empty,
    /// A valid command.
    Command(Command),
    /// Help text requested with `help` or `--help`.
    Help(String),
    /// Unknown command or wrong number of arguments.
    Invalid,
    /// Known command with an argument that failed to parse.
    BadValue(String),
}

/// Parse one prompt line.
pub fn parse(line: &str) -> Parsed {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Parsed::Empty;
    }

    match CommandLine::try_parse_from(words) {
        Ok(parsed) => Parsed::Command(parsed.command),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                Parsed::Help(e.render().to_string())
            }
            ErrorKind::ValueValidation | ErrorKind::InvalidValue => {
                Parsed::BadValue(first_line(&e.to_string()))
            }
            _ => Parsed::Invalid,
        },
    }
}

fn first_line(rendered: &str) -> String {
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

/// Execute a parsed command against the session.
pub fn run(command: Command, session: &mut Session) -> anyhow::Result<Flow> {
    match command {
        Command::List => devices::list(session)?,
        Command::Create {
            input,
            output,
            sample_rate,
        } => routes::create(session, input, output, sample_rate)?,
        Command::Stop { route_id } => routes::stop(session, route_id)?,
        Command::Routes => routes::show(session),
        Command::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}
