use blockprof::control::send_command;
use blockprof::{Command, ControlError, DEFAULT_SOCKET_NAME};
use clap::{ArgGroup, CommandFactory, Parser};
use spdlog::prelude::*;
use std::process::ExitCode;

/// Controls an already running instrumented process on this machine.
#[derive(Parser)]
#[command(name = "blockprof-ctl", version, about)]
#[command(group(ArgGroup::new("action").args(["enable", "disable", "print", "clear"])))]
struct Args {
    /// Enables instrumentation in the running process
    #[arg(short, long)]
    enable: bool,
    /// Disables instrumentation in the running process
    #[arg(short, long)]
    disable: bool,
    /// Prints the offline analysis tables in the running process
    #[arg(short, long)]
    print: bool,
    /// Clears the offline analysis history in the running process
    #[arg(short, long)]
    clear: bool,
    /// Abstract socket name the running process listens on
    #[arg(long, default_value = DEFAULT_SOCKET_NAME)]
    socket: String,
}

impl Args {
    fn action(&self) -> Option<Command> {
        if self.enable {
            Some(Command::Enable)
        } else if self.disable {
            Some(Command::Disable)
        } else if self.print {
            Some(Command::Print)
        } else if self.clear {
            Some(Command::Clear)
        } else {
            None
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let Some(command) = args.action() else {
        let _ = Args::command().print_help();
        return ExitCode::SUCCESS;
    };

    match send_command(&args.socket, command) {
        Ok(()) => {
            info!("[Control] Sent '{}' to '{}'", command, args.socket);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("[Control] {}", err);
            if matches!(err, ControlError::Connect { .. }) {
                error!("[Control] Make sure that an instrumented process is running on this machine.");
                error!("[Control] Its listener does not start until the first start call.");
            }
            ExitCode::FAILURE
        }
    }
}
