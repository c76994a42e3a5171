mod debugger;
mod logging;
mod py_bindings;
mod repl;
mod script_config;
mod session;
mod settings;

use anyhow::Result;
use pyo3::prelude::*;
use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info};

use repl::Repl;
use session::{ExecError, SessionRuntime};
use settings::{DEBUG_FLAG, REPL_FLAG, Settings, SharedSettings};

/// Configuration file used when only the REPL runs
const REPL_CONFIG: &str = "repl.INI";

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success = 0,
    NoScript = 1,
    ScriptNotFound = 2,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> ExitCode {
        ExitCode::from(exit as u8)
    }
}

fn main() -> Result<ExitCode> {
    logging::init();

    let settings = Settings::parse(env::args().skip(1)).into_shared();
    Python::initialize();

    Ok(run(settings)?.into())
}

fn run(settings: SharedSettings) -> Result<Exit> {
    if settings.read().is_switch_on(DEBUG_FLAG) {
        debugger::launch();
    }

    let session = SessionRuntime::new(settings.clone())?;
    session.register_capabilities();

    let (script, transcript, wants_repl) = {
        let settings = settings.read();
        (
            settings.script_path(),
            settings.transcript_path(),
            settings.contains(REPL_FLAG),
        )
    };

    match &script {
        // Anything but a regular file (missing, directory) counts as not found
        Some(path) if !path.is_file() => {
            println!("Script {} not found.", path.display());
            return Ok(Exit::ScriptNotFound);
        }
        Some(path) => session.attach_script_config(&script_config::config_path_for(path))?,
        None if !wants_repl => {
            println!("No script.");
            return Ok(Exit::NoScript);
        }
        None => session.attach_script_config(Path::new(REPL_CONFIG))?,
    }

    if let Some(path) = &script {
        info!(script = %path.display(), "running script");
        match session.execute_script(path, &mut io::stdout()) {
            Ok(()) => debug!("script finished"),
            Err(err @ ExecError::Script { .. }) => debug!(error = %err, "script raised"),
            Err(err) => error!(script = %path.display(), error = %err, "script failed"),
        }
        session.flush_output();
    }

    if wants_repl {
        info!(transcript = ?transcript, "entering repl");
        let repl = Repl::new(settings.clone(), transcript);
        let mut input = repl::stdin_source();
        let mut session = session;
        if let Err(err) = repl.run(input.as_mut(), &mut session, &mut io::stdout()) {
            error!(error = %err, "repl input failed");
        }
        session.flush_output();
    }

    Ok(Exit::Success)
}
