//! Decides which host capabilities a script can reach and under which names.

use std::io;
use std::path::PathBuf;

use pyo3::prelude::*;
use tracing::{debug, warn};

use super::attach::{self, AttachError, Attacher};
use super::interop::{BASELINE_LIBRARIES, ExtendedHostFunctions, HostFunctions, TypeCollection};
use super::platform::{
    ConsoleOps, DateTimeOps, DebuggerOps, DirectoryInfo, DirectoryOps, EnvironmentOps, FileOps,
    PathOps, ProcessOps, StringOps,
};
use super::settings::SettingsObject;
use super::{CapabilityBinding, Engine, EngineHandle, names};
use crate::script_config::ScriptIni;
use crate::session::ExecError;
use crate::settings::SharedSettings;

/// Bind every capability group into the engine.
///
/// Groups are independent: a failing group is logged and skipped, the rest
/// still get registered. Meant to be called once per engine.
pub fn register(py: Python<'_>, engine: &Engine, settings: &SharedSettings) {
    skip_on_failure("internal", register_internal(py, engine, settings));
    skip_on_failure("platform", register_platform(py, engine));
    skip_on_failure("interop", register_interop(py, engine, settings));
    skip_on_failure("functions", register_functions(py, engine));
    skip_on_failure("prelude", engine.run_prelude(py));
}

fn skip_on_failure(group: &str, result: PyResult<()>) {
    match result {
        Ok(()) => debug!(group, "capabilities registered"),
        Err(err) => warn!(group, error = %err, "capability group skipped"),
    }
}

fn register_internal(py: Python<'_>, engine: &Engine, settings: &SharedSettings) -> PyResult<()> {
    let handle = Bound::new(py, EngineHandle::new(engine.clone_ref(py)))?.into_any();
    engine.bind(py, CapabilityBinding::object(names::ENGINE, handle))?;
    engine.bind(py, CapabilityBinding::host_type::<ScriptIni>(py, names::CONFIG_TYPE))?;
    let settings = Bound::new(py, SettingsObject::new(settings.clone()))?.into_any();
    engine.bind(py, CapabilityBinding::object(names::SETTINGS, settings))?;
    engine.bind(py, CapabilityBinding::host_type::<ProcessOps>(py, names::PROCESS))
}

fn register_platform(py: Python<'_>, engine: &Engine) -> PyResult<()> {
    let types = [
        CapabilityBinding::host_type::<FileOps>(py, names::FILE),
        CapabilityBinding::host_type::<ConsoleOps>(py, names::CONSOLE),
        CapabilityBinding::host_type::<PathOps>(py, names::PATH),
        CapabilityBinding::host_type::<DirectoryOps>(py, names::DIRECTORY),
        CapabilityBinding::host_type::<DirectoryInfo>(py, names::DIRECTORY_INFO),
        CapabilityBinding::host_type::<EnvironmentOps>(py, names::ENVIRONMENT),
        CapabilityBinding::host_type::<StringOps>(py, names::STRING),
        CapabilityBinding::host_type::<DateTimeOps>(py, names::DATE_TIME),
        CapabilityBinding::host_type::<DebuggerOps>(py, names::DEBUGGER),
    ];
    for binding in types {
        engine.bind(py, binding)?;
    }
    Ok(())
}

fn register_interop(py: Python<'_>, engine: &Engine, settings: &SharedSettings) -> PyResult<()> {
    let extended = Bound::new(py, ExtendedHostFunctions)?.into_any();
    engine.bind(py, CapabilityBinding::object(names::EXTENDED_HOST, extended))?;
    let host = Bound::new(py, HostFunctions)?.into_any();
    engine.bind(py, CapabilityBinding::object(names::HOST, host))?;

    let mut bundle = TypeCollection::default();
    for library in BASELINE_LIBRARIES {
        fold_or_report(&mut bundle, library, attach::resolve_library(py, library));
    }
    let extra = settings.read().extra_libraries();
    for entry in &extra {
        fold_or_report(&mut bundle, entry, attach::load_library_from(py, entry));
    }

    let bundle = Bound::new(py, bundle)?.into_any();
    engine.bind(py, CapabilityBinding::object(names::TYPES, bundle))
}

/// Fold one library into the startup bundle; a failure is printed and the entry skipped
fn fold_or_report(
    bundle: &mut TypeCollection,
    entry: &str,
    library: Result<Bound<'_, PyModule>, AttachError>,
) {
    let result = library.and_then(|library| {
        bundle
            .fold(&library)
            .map_err(|failures| AttachError::TypeLoad {
                library: entry.to_string(),
                failures,
            })
    });
    match result {
        Ok(count) => debug!(library = entry, types = count, "library folded"),
        Err(err) => {
            warn!(library = entry, error = %err, "library skipped");
            for line in err.report_lines() {
                println!("{line}");
            }
        }
    }
}

fn register_functions(py: Python<'_>, engine: &Engine) -> PyResult<()> {
    let print = wrap_pyfunction!(print, py)?.into_any();
    engine.bind(py, CapabilityBinding::function(names::PRINT, print))?;

    for name in [names::RUN, names::INCLUDE] {
        let runner = Bound::new(py, ScriptRunner::new(engine.clone_ref(py)))?.into_any();
        engine.bind(py, CapabilityBinding::function(name, runner))?;
    }

    let attacher = Bound::new(py, Attacher::new(engine.clone_ref(py)))?.into_any();
    engine.bind(py, CapabilityBinding::function(names::ATTACH, attacher))
}

/// Write one value to stdout, newline-terminated
#[pyfunction]
fn print(value: &Bound<PyAny>) -> PyResult<()> {
    println!("{}", value.str()?);
    Ok(())
}

/// `run(path)` / `include(path)`: execute a file's contents in the session if it exists
#[pyclass(name = "Run", module = "lychen", frozen)]
pub struct ScriptRunner {
    engine: Engine,
}

impl ScriptRunner {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[pymethods]
impl ScriptRunner {
    /// Failures are reported and swallowed so the caller keeps going
    fn __call__(&self, py: Python, path: PathBuf) -> PyResult<()> {
        if !path.is_file() {
            debug!(path = %path.display(), "run: no such file");
            return Ok(());
        }
        let outcome = ExecError::run_file(py, &self.engine, &path);
        if let Err(err) = outcome {
            warn!(path = %path.display(), error = %err, "run failed");
            err.report_script(&mut io::stdout())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::ffi::CString;
    use std::fs;

    fn registered_engine(py: Python<'_>, args: &[&str]) -> Engine {
        let settings = Settings::parse(args.iter().copied()).into_shared();
        let engine = Engine::new(py).unwrap();
        register(py, &engine, &settings);
        engine
    }

    fn check(py: Python<'_>, engine: &Engine, code: &str) {
        let code = CString::new(code).unwrap();
        engine.execute(py, &code).unwrap();
    }

    #[test]
    fn every_capability_is_bound() {
        Python::attach(|py| {
            let engine = registered_engine(py, &[]);
            for name in [
                names::ENGINE,
                names::SETTINGS,
                names::CONFIG_TYPE,
                names::PROCESS,
                names::FILE,
                names::CONSOLE,
                names::PATH,
                names::DIRECTORY,
                names::DIRECTORY_INFO,
                names::ENVIRONMENT,
                names::STRING,
                names::DATE_TIME,
                names::DEBUGGER,
                names::EXTENDED_HOST,
                names::HOST,
                names::TYPES,
                names::PRINT,
                names::RUN,
                names::INCLUDE,
                names::ATTACH,
                "include_once",
            ] {
                assert!(engine.lookup(py, name).unwrap().is_some(), "{name} missing");
            }
            assert!(engine.lookup(py, names::SCRIPT_CONFIG).unwrap().is_none());
        });
    }

    #[test]
    fn baseline_bundle_holds_core_types() {
        Python::attach(|py| {
            let engine = registered_engine(py, &[]);
            check(
                py,
                &engine,
                "assert LY.int is int\nassert 'OrderedDict' in LY\nassert 'builtins' in LY.libraries()",
            );
        });
    }

    #[test]
    fn extra_libraries_fold_and_bad_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widgets.py");
        fs::write(&file, "class Widget:\n    pass\n").unwrap();
        let flag = format!("/ASSEMBLIES:{},no_such_library_here", file.display());
        Python::attach(|py| {
            let engine = registered_engine(py, &[flag.as_str()]);
            check(py, &engine, "assert 'Widget' in LY and 'OrderedDict' in LY");
        });
    }

    #[test]
    fn run_and_include_share_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.py");
        let bad = dir.path().join("bad.py");
        fs::write(&lib, "def double(x):\n    return x * 2\n").unwrap();
        fs::write(&bad, "raise ValueError('bad script')\n").unwrap();
        Python::attach(|py| {
            let engine = registered_engine(py, &[]);
            check(
                py,
                &engine,
                &format!(
                    "include({lib:?})\nassert double(4) == 8\nrun({bad:?})\nrun('missing.py')\nreached = True",
                    lib = lib.display().to_string(),
                    bad = bad.display().to_string()
                ),
            );
            let reached = engine.lookup(py, "reached").unwrap().unwrap();
            assert!(reached.extract::<bool>().unwrap());
        });
    }

    #[test]
    fn include_once_refuses_second_include() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("counter.py");
        fs::write(&lib, "count = globals().get('count', 0) + 1\n").unwrap();
        Python::attach(|py| {
            let engine = registered_engine(py, &[]);
            check(
                py,
                &engine,
                &format!(
                    "include_once({p:?})\ntry:\n    include_once({p:?})\nexcept RuntimeError:\n    pass\nassert count == 1",
                    p = lib.display().to_string()
                ),
            );
        });
    }
}
