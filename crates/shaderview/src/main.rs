mod cli;
mod config;
mod logging;
mod run;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use logging::LogSession;
use run::AppError;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(err.exit_code().clamp(0, 255) as u8);
        }
    };

    let session = match LogSession::open(&cli.log_file) {
        Ok(session) => session,
        Err(err) => {
            let err = AppError::from(err);
            eprintln!("Error: {err}");
            return ExitCode::from(err.exit_code());
        }
    };

    session.scope(|| {
        tracing::info!(log_file = %session.path().display(), "Log file opened.");
        match run::run(cli) {
            Ok(()) => {
                tracing::info!("Program terminated successfully.");
                ExitCode::SUCCESS
            }
            Err(err) => {
                let code = err.exit_code();
                if err.already_logged() {
                    tracing::error!(exit_code = code, "exiting after shader failure");
                } else {
                    tracing::error!(exit_code = code, "{err}");
                }
                ExitCode::from(code)
            }
        }
    })
}
