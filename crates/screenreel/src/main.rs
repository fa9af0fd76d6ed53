//! Screenreel worker binary and operator CLI.
//!
//! `record` is the subprocess the controller library spawns for each
//! session. `list` answers capability queries (JSON on standard error, so
//! listings never mix with log traffic on standard output). `events` is the
//! operator surface for poking the bus by hand.

mod capture;
mod devices;
mod listen;
#[cfg(test)]
mod tests;
mod worker;

use screenreel_core::Result;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screenreel", version, about = "Screen recorder worker and control CLI")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run a recording session until signalled to stop.
    Record {
        /// Process-instance id scoping this session's topics.
        #[arg(long, default_value = "main")]
        process_id: String,
        /// Resolved recording options as a JSON object.
        options: String,
    },
    /// Print capture sources as JSON on standard error.
    List {
        #[command(subcommand)]
        kind: ListKind,
    },
    /// Publish and observe bus events.
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },
}

#[derive(Subcommand)]
enum ListKind {
    /// Screens available for capture.
    Screens,
    /// Audio input devices available for capture.
    AudioDevices,
}

#[derive(Subcommand)]
enum EventsCommand {
    /// Perform one request/response exchange and print the reply payload.
    Send {
        #[command(flatten)]
        target: EventTarget,
        /// Optional request payload.
        data: Option<String>,
    },
    /// Answer requests for one event, printing each payload.
    Listen {
        #[command(flatten)]
        target: EventTarget,
        /// Exit after the first request.
        #[arg(long)]
        exit: bool,
    },
    /// Print every lifecycle event for a process id.
    ListenAll {
        /// Process-instance id to observe.
        #[arg(long, default_value = "main")]
        process_id: String,
    },
}

#[derive(Args)]
struct EventTarget {
    /// Process-instance id scoping the topic.
    #[arg(long, default_value = "main")]
    process_id: String,
    /// Event name, for example `isPaused`.
    event: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("screenreel=info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        CliCommand::Record {
            process_id,
            options,
        } => worker::run(&process_id, &options).await,
        CliCommand::List { kind } => {
            let devices = match kind {
                ListKind::Screens => devices::screens(),
                ListKind::AudioDevices => devices::audio_devices()?,
            };
            eprintln!("{}", serde_json::to_string(&devices)?);
            Ok(())
        }
        CliCommand::Events { command } => match command {
            EventsCommand::Send { target, data } => {
                listen::send(&target.process_id, &target.event, data).await
            }
            EventsCommand::Listen { target, exit } => {
                listen::listen(&target.process_id, &target.event, exit).await
            }
            EventsCommand::ListenAll { process_id } => listen::listen_all(&process_id).await,
        },
    }
}
