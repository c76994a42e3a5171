use std::ffi::CString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use pyo3::exceptions::{PyAttributeError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyString, PyTracebackMethods};
use thiserror::Error;
use tracing::debug;

use crate::py_bindings::{CapabilityBinding, Engine, names, registry};
use crate::repl::{ErrorKind, ExecutionResult, StatementExecutor};
use crate::script_config::ScriptIni;
use crate::settings::SharedSettings;

/// Failure at the execution boundary, classified for reporting
#[derive(Debug, Error)]
pub enum ExecError {
    /// Raised by script code inside the interpreter
    #[error("{kind}: {details}")]
    Script {
        kind: String,
        details: String,
        stack: String,
    },
    /// Script code used None as if it were an object
    #[error("{0}")]
    NullReference(String),
    /// Failed on the host side before the interpreter got involved
    #[error("{0}")]
    Host(String),
}

impl ExecError {
    pub fn host(err: impl fmt::Display) -> Self {
        ExecError::Host(err.to_string())
    }

    pub fn from_py(py: Python<'_>, err: PyErr) -> Self {
        let details = err.value(py).to_string();
        let none_access =
            err.is_instance_of::<PyAttributeError>(py) || err.is_instance_of::<PyTypeError>(py);
        if none_access && details.contains("'NoneType'") {
            return ExecError::NullReference(details);
        }
        let kind = err
            .get_type(py)
            .qualname()
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "Exception".to_string());
        let stack = err
            .traceback(py)
            .and_then(|traceback| traceback.format().ok())
            .unwrap_or_default();
        ExecError::Script {
            kind,
            details,
            stack,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Script { .. } => ErrorKind::Script,
            ExecError::NullReference(_) => ErrorKind::NullReference,
            ExecError::Host(_) => ErrorKind::Host,
        }
    }

    /// Read a file and run it as a complete program in the engine's session
    pub fn run_file(py: Python<'_>, engine: &Engine, path: &Path) -> Result<(), ExecError> {
        let source = fs::read_to_string(path)
            .map_err(|err| ExecError::Host(format!("{}: {err}", path.display())))?;
        let program = CString::new(source).map_err(ExecError::host)?;
        engine
            .execute(py, &program)
            .map_err(|err| ExecError::from_py(py, err))
    }

    /// Statement failures: interpreter errors carry their stack, the rest only a message
    pub fn report_statement(&self, out: &mut dyn Write) -> io::Result<()> {
        match self {
            ExecError::Script { details, stack, .. } => {
                writeln!(out, "{details}")?;
                write!(out, "{stack}")?;
                if !stack.is_empty() && !stack.ends_with('\n') {
                    writeln!(out)?;
                }
                Ok(())
            }
            ExecError::NullReference(message) | ExecError::Host(message) => {
                writeln!(out, "{message}")
            }
        }
    }

    /// Script-file failures: only interpreter errors are shown here
    pub fn report_script(&self, out: &mut dyn Write) -> io::Result<()> {
        if let ExecError::Script { kind, details, .. } = self {
            writeln!(out, "{kind}")?;
            writeln!(out, "{details}")?;
        }
        Ok(())
    }
}

/// The process-wide interpreter session
pub struct SessionRuntime {
    engine: Engine,
    settings: SharedSettings,
}

impl SessionRuntime {
    pub fn new(settings: SharedSettings) -> PyResult<Self> {
        let engine = Python::attach(Engine::new)?;
        Ok(Self { engine, settings })
    }

    pub fn register_capabilities(&self) {
        Python::attach(|py| registry::register(py, &self.engine, &self.settings));
    }

    /// Expose the configuration file at `path` as the per-script configuration object
    pub fn attach_script_config(&self, path: &Path) -> PyResult<()> {
        debug!(path = %path.display(), "script configuration");
        Python::attach(|py| {
            let config = Bound::new(py, ScriptIni::open(path))?.into_any();
            self.engine
                .bind(py, CapabilityBinding::object(names::SCRIPT_CONFIG, config))
        })
    }

    /// Run a script file; interpreter errors are reported to `out`, every
    /// failure is returned for the caller to log
    pub fn execute_script(&self, path: &Path, out: &mut dyn Write) -> Result<(), ExecError> {
        let result = Python::attach(|py| ExecError::run_file(py, &self.engine, path));
        if let Err(err) = &result {
            // A closed stdout must not turn a script error into a host error
            let _ = err.report_script(out);
        }
        result
    }

    /// Run one line in the persistent session and return its value
    pub fn evaluate(&self, line: &str) -> Result<Py<PyAny>, ExecError> {
        let line = CString::new(line).map_err(ExecError::host)?;
        Python::attach(|py| {
            self.engine
                .execute_command(py, &line)
                .map_err(|err| ExecError::from_py(py, err))
        })
    }

    /// Flush anything the interpreter still buffers for stdout/stderr
    pub fn flush_output(&self) {
        Python::attach(|py| {
            if let Err(err) = Engine::flush_streams(py) {
                debug!(error = %err, "flush failed");
            }
        });
    }
}

impl StatementExecutor for SessionRuntime {
    type Value = Py<PyAny>;

    fn execute_statement(&mut self, line: &str, out: &mut dyn Write) -> (Py<PyAny>, ExecutionResult) {
        match self.evaluate(line) {
            Ok(value) => (value, Ok(())),
            Err(err) => {
                let _ = err.report_statement(out);
                let empty = Python::attach(|py| PyString::new(py, "").into_any().unbind());
                (empty, Err(err.kind()))
            }
        }
    }
}
