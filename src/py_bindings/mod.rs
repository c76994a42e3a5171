pub mod attach;
pub mod interop;
pub mod platform;
pub mod registry;
pub mod settings;

use pyo3::exceptions::{PySyntaxError, PyTypeError};
use pyo3::PyTypeInfo;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyType};
use std::ffi::{CStr, CString};

/// Names under which capabilities appear in the script namespace
pub mod names {
    pub const ENGINE: &str = "ENGINE";
    pub const SETTINGS: &str = "LYSettings";
    pub const CONFIG_TYPE: &str = "LYINI";
    pub const SCRIPT_CONFIG: &str = "LYScriptINI";
    pub const PROCESS: &str = "LYProcess";

    pub const FILE: &str = "LYFile";
    pub const CONSOLE: &str = "LYConsole";
    pub const PATH: &str = "LYPath";
    pub const DIRECTORY: &str = "LYDirectory";
    pub const DIRECTORY_INFO: &str = "LYDirectoryInfo";
    pub const ENVIRONMENT: &str = "LYEnvironment";
    pub const STRING: &str = "LYString";
    pub const DATE_TIME: &str = "LYDateTime";
    pub const DEBUGGER: &str = "LYDebugger";

    pub const EXTENDED_HOST: &str = "LYExtendedHost";
    pub const HOST: &str = "LYHost";
    pub const TYPES: &str = "LY";

    pub const PRINT: &str = "print";
    pub const RUN: &str = "run";
    pub const INCLUDE: &str = "include";
    pub const ATTACH: &str = "attach";
}

// Script-level helpers that are easier to express in Python itself
const PRELUDE: &str = include_str!("../../python/prelude.py");

const COMMAND_FILENAME: &str = "<command>";

/// How a binding is exposed to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// An opaque host value
    HostObject,
    /// A host type whose static operations are callable without an instance
    HostType,
    /// A free callable
    HostFunction,
}

/// A named entry point into host functionality
pub struct CapabilityBinding {
    pub name: String,
    pub kind: BindingKind,
    pub target: Py<PyAny>,
}

impl CapabilityBinding {
    pub fn object(name: &str, target: Bound<'_, PyAny>) -> Self {
        Self {
            name: name.to_string(),
            kind: BindingKind::HostObject,
            target: target.unbind(),
        }
    }

    pub fn host_type<T: PyTypeInfo>(py: Python<'_>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: BindingKind::HostType,
            target: py.get_type::<T>().into_any().unbind(),
        }
    }

    pub fn function(name: &str, target: Bound<'_, PyAny>) -> Self {
        Self {
            name: name.to_string(),
            kind: BindingKind::HostFunction,
            target: target.unbind(),
        }
    }
}

/// The embedded interpreter session: one persistent globals namespace
pub struct Engine {
    globals: Py<PyDict>,
}

impl Engine {
    pub fn new(py: Python<'_>) -> PyResult<Self> {
        let globals = PyDict::new(py);
        globals.set_item("__builtins__", py.import("builtins")?)?;
        globals.set_item("__name__", "__main__")?;
        Ok(Self {
            globals: globals.unbind(),
        })
    }

    pub fn clone_ref(&self, py: Python<'_>) -> Self {
        Self {
            globals: self.globals.clone_ref(py),
        }
    }

    pub fn globals<'py>(&self, py: Python<'py>) -> &Bound<'py, PyDict> {
        self.globals.bind(py)
    }

    /// Expose a binding in the namespace; a later binding of the same name wins
    pub fn bind(&self, py: Python<'_>, binding: CapabilityBinding) -> PyResult<()> {
        let target = binding.target.bind(py);
        match binding.kind {
            BindingKind::HostType if !target.is_instance_of::<PyType>() => {
                return Err(PyTypeError::new_err(format!(
                    "binding '{}' is not a type",
                    binding.name
                )));
            }
            BindingKind::HostFunction if !target.is_callable() => {
                return Err(PyTypeError::new_err(format!(
                    "binding '{}' is not callable",
                    binding.name
                )));
            }
            _ => {}
        }
        tracing::debug!(name = %binding.name, kind = ?binding.kind, "bind");
        self.globals(py).set_item(binding.name.as_str(), target)
    }

    pub fn lookup<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
        self.globals(py).get_item(name)
    }

    /// Run a complete program against the session namespace
    pub fn execute(&self, py: Python<'_>, program: &CStr) -> PyResult<()> {
        py.run(program, Some(self.globals(py)), None)
    }

    /// Run one line: evaluated for its value when it is an expression,
    /// executed as a statement (yielding None) otherwise
    pub fn execute_command(&self, py: Python<'_>, line: &CStr) -> PyResult<Py<PyAny>> {
        let builtins = py.import("builtins")?;
        let source = line.to_str()?;
        match builtins.call_method1("compile", (source, COMMAND_FILENAME, "eval")) {
            Ok(code) => Ok(builtins
                .call_method1("eval", (code, self.globals(py)))?
                .unbind()),
            Err(err) if err.is_instance_of::<PySyntaxError>(py) => {
                self.execute(py, line)?;
                Ok(py.None())
            }
            Err(err) => Err(err),
        }
    }

    /// Run the embedded script prelude in the session namespace
    pub fn run_prelude(&self, py: Python<'_>) -> PyResult<()> {
        let prelude = CString::new(PRELUDE)?;
        self.execute(py, &prelude)
    }

    /// Flush Python-side stdio; the interpreter is never finalized
    pub fn flush_streams(py: Python<'_>) -> PyResult<()> {
        let sys = py.import("sys")?;
        for stream in ["stdout", "stderr"] {
            let handle = sys.getattr(stream)?;
            if !handle.is_none() {
                handle.call_method0("flush")?;
            }
        }
        Ok(())
    }
}

/// The engine as seen from scripts, so a script can reconfigure its own session
#[pyclass(name = "Engine", module = "lychen", frozen)]
pub struct EngineHandle {
    engine: Engine,
}

impl EngineHandle {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[pymethods]
impl EngineHandle {
    fn execute(&self, py: Python<'_>, code: &str) -> PyResult<()> {
        let code = CString::new(code)?;
        self.engine.execute(py, &code)
    }

    fn execute_command(&self, py: Python<'_>, line: &str) -> PyResult<Py<PyAny>> {
        let line = CString::new(line)?;
        self.engine.execute_command(py, &line)
    }

    fn add_host_object(&self, py: Python<'_>, name: &str, target: Bound<'_, PyAny>) -> PyResult<()> {
        self.engine.bind(py, CapabilityBinding::object(name, target))
    }

    fn add_host_type(&self, py: Python<'_>, name: &str, target: Bound<'_, PyAny>) -> PyResult<()> {
        self.engine.bind(
            py,
            CapabilityBinding {
                name: name.to_string(),
                kind: BindingKind::HostType,
                target: target.unbind(),
            },
        )
    }

    fn globals(&self, py: Python<'_>) -> Py<PyDict> {
        self.engine.globals.clone_ref(py)
    }
}
