use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use pyo3::exceptions::{PyImportError, PyModuleNotFoundError, PyRuntimeError};
use pyo3::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use super::interop::TypeCollection;
use super::{CapabilityBinding, Engine};

const UNVERSIONED: &str = "0.0.0";
const BUILT_IN: &str = "built-in";

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("unable to load one or more types from {library}")]
    TypeLoad {
        library: String,
        failures: Vec<String>,
    },
    #[error("could not resolve library '{0}'")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

impl AttachError {
    fn other(err: impl fmt::Display) -> Self {
        AttachError::Other(err.to_string())
    }

    /// Lines shown to the user: one per loader failure for type-load errors
    pub fn report_lines(&self) -> Vec<String> {
        match self {
            AttachError::TypeLoad { failures, .. } => failures.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<AttachError> for PyErr {
    fn from(err: AttachError) -> PyErr {
        match &err {
            AttachError::NotFound(_) => PyModuleNotFoundError::new_err(err.to_string()),
            AttachError::TypeLoad { failures, .. } => {
                PyImportError::new_err(format!("{err}: {}", failures.join("; ")))
            }
            AttachError::Other(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// What a caller asked for: `name` or `name, Version=x.y, ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRequest {
    pub name: String,
    pub version: Option<String>,
}

impl LibraryRequest {
    pub fn parse(identifier: &str) -> Self {
        let mut parts = identifier.split(',');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let version = parts
            .filter_map(|part| part.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("version"))
            .map(|(_, value)| value.trim().to_string());
        Self { name, version }
    }
}

/// Identity of a resolved library, rendered as `name, Version=v, Location=l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryIdentity {
    pub name: String,
    pub version: String,
    pub location: String,
}

impl LibraryIdentity {
    pub fn of(library: &Bound<PyModule>) -> PyResult<Self> {
        let optional = |attr: &str| -> Option<String> {
            library
                .getattr(attr)
                .ok()
                .and_then(|value| value.extract::<String>().ok())
        };
        Ok(Self {
            name: library.name()?.to_string(),
            version: optional("__version__").unwrap_or_else(|| UNVERSIONED.to_string()),
            location: optional("__file__").unwrap_or_else(|| BUILT_IN.to_string()),
        })
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Location={}",
            self.name, self.version, self.location
        )
    }
}

/// The explicit name when one was given, otherwise the identity's short name
pub fn bundle_name(explicit_name: &str, identity: &str) -> String {
    if !explicit_name.is_empty() {
        return explicit_name.to_string();
    }
    identity.split(',').next().unwrap_or_default().to_string()
}

/// Resolve a library by identity (never by file location)
pub fn resolve_library<'py>(
    py: Python<'py>,
    identifier: &str,
) -> Result<Bound<'py, PyModule>, AttachError> {
    let request = LibraryRequest::parse(identifier);
    if request.name.is_empty() {
        return Err(AttachError::NotFound(identifier.to_string()));
    }

    let library = py.import(request.name.as_str()).map_err(|err| {
        if err.is_instance_of::<PyModuleNotFoundError>(py) {
            AttachError::NotFound(request.name.clone())
        } else {
            AttachError::other(err)
        }
    })?;

    if let Some(wanted) = &request.version {
        let identity = LibraryIdentity::of(&library).map_err(AttachError::other)?;
        if identity.version != *wanted {
            return Err(AttachError::NotFound(format!(
                "{}, Version={wanted} (loaded {})",
                request.name, identity.version
            )));
        }
    }
    Ok(library)
}

/// Load a startup library: an existing `.py` file or package directory is
/// loaded from its location, anything else is resolved by identity
pub fn load_library_from<'py>(
    py: Python<'py>,
    entry: &str,
) -> Result<Bound<'py, PyModule>, AttachError> {
    let path = Path::new(entry);
    if !path.exists() {
        return resolve_library(py, entry);
    }
    let file = if path.is_dir() {
        path.join("__init__.py")
    } else {
        path.to_path_buf()
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| AttachError::NotFound(entry.to_string()))?;
    import_from_file(py, &name, &file).map_err(AttachError::other)
}

fn import_from_file<'py>(py: Python<'py>, name: &str, file: &Path) -> PyResult<Bound<'py, PyModule>> {
    let util = py.import("importlib.util")?;
    let spec = util.call_method1("spec_from_file_location", (name, file))?;
    if spec.is_none() {
        return Err(PyImportError::new_err(format!(
            "cannot load {}",
            file.display()
        )));
    }
    let library = util.call_method1("module_from_spec", (&spec,))?;
    py.import("sys")?
        .getattr("modules")?
        .set_item(name, &library)?;
    spec.getattr("loader")?
        .call_method1("exec_module", (&library,))?;
    Ok(library.cast_into::<PyModule>()?)
}

/// Outcome of a successful attach
#[derive(Debug, Clone)]
pub struct AttachedBundle {
    pub identity: LibraryIdentity,
    pub name: String,
    pub types: Vec<String>,
}

/// Resolve `identifier`, fold its types into a new bundle and bind it
pub fn attach(
    py: Python<'_>,
    engine: &Engine,
    identifier: &str,
    explicit_name: &str,
) -> Result<AttachedBundle, AttachError> {
    let library = resolve_library(py, identifier)?;
    let identity = LibraryIdentity::of(&library).map_err(AttachError::other)?;

    let mut bundle = TypeCollection::default();
    bundle
        .fold(&library)
        .map_err(|failures| AttachError::TypeLoad {
            library: identity.name.clone(),
            failures,
        })?;
    let types = bundle.type_names();

    let name = bundle_name(explicit_name, &identity.to_string());
    let target = Bound::new(py, bundle)
        .map_err(AttachError::other)?
        .into_any();
    engine
        .bind(py, CapabilityBinding::object(&name, target))
        .map_err(AttachError::other)?;

    Ok(AttachedBundle {
        identity,
        name,
        types,
    })
}

/// Print the outcome of an attach call
pub fn report(
    identifier: &str,
    outcome: &Result<AttachedBundle, AttachError>,
    out: &mut dyn Write,
) -> io::Result<()> {
    match outcome {
        Ok(bundle) => writeln!(out, "Attached {identifier} as {}", bundle.name),
        Err(err) => {
            for line in err.report_lines() {
                writeln!(out, "{line}")?;
            }
            Ok(())
        }
    }
}

/// The script-facing `attach(identifier, name="")`; never raises
#[pyclass(name = "Attach", module = "lychen", frozen)]
pub struct Attacher {
    engine: Engine,
}

impl Attacher {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[pymethods]
impl Attacher {
    #[pyo3(signature = (identifier, name = ""))]
    fn __call__(&self, py: Python, identifier: &str, name: &str) -> PyResult<()> {
        let outcome = attach(py, &self.engine, identifier, name);
        match &outcome {
            Ok(bundle) => info!(
                library = %bundle.identity,
                name = %bundle.name,
                types = bundle.types.len(),
                "attached"
            ),
            Err(err) => warn!(%identifier, error = %err, "attach failed"),
        }
        report(identifier, &outcome, &mut io::stdout())?;
        Ok(())
    }
}
