use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;
use pyo3::prelude::*;
use tracing::{debug, warn};

/// Extension of the per-script configuration file
pub const CONFIG_EXTENSION: &str = "INI";

/// `<dir>/<stem>.INI` for a script path
pub fn config_path_for(script: &Path) -> PathBuf {
    script.with_extension(CONFIG_EXTENSION)
}

fn section_name(section: &str) -> Option<&str> {
    (!section.is_empty()).then_some(section)
}

/// Key/value sections read from an INI file next to the script.
///
/// Keys outside any section live in the section named "". Writes are
/// persisted immediately.
#[pyclass(name = "INI", module = "lychen")]
pub struct ScriptIni {
    path: PathBuf,
    document: Ini,
}

impl ScriptIni {
    /// A missing file is an empty document; so is one that fails to parse
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = Self::load(&path);
        Self { path, document }
    }

    fn load(path: &Path) -> Ini {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file");
            return Ini::new();
        }
        match Ini::load_from_file(path) {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "configuration file ignored");
                Ini::new()
            }
        }
    }

    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.document
            .section(section_name(section))
            .and_then(|properties| properties.get(key))
    }

    pub fn set_value(&mut self, section: &str, key: &str, value: &str) -> io::Result<()> {
        self.document
            .with_section(section_name(section))
            .set(key, value);
        self.document.write_to_file(&self.path)
    }
}

#[pymethods]
impl ScriptIni {
    #[new]
    fn new(path: PathBuf) -> Self {
        Self::open(path)
    }

    #[getter]
    fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    #[pyo3(signature = (section, key, default = None))]
    fn read(&self, section: &str, key: &str, default: Option<String>) -> Option<String> {
        self.value(section, key).map(str::to_string).or(default)
    }

    fn write(&mut self, section: &str, key: &str, value: &Bound<PyAny>) -> PyResult<()> {
        let value = value.str()?.to_string();
        Ok(self.set_value(section, key, &value)?)
    }

    fn has(&self, section: &str, key: &str) -> bool {
        self.value(section, key).is_some()
    }

    fn sections(&self) -> Vec<String> {
        self.document
            .sections()
            .map(|name| name.unwrap_or_default().to_string())
            .collect()
    }

    fn keys(&self, section: &str) -> Vec<String> {
        self.document
            .section(section_name(section))
            .map(|properties| properties.iter().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default()
    }

    /// Re-read the file from disk, dropping unsaved state
    fn reload(&mut self) {
        self.document = Self::load(&self.path);
    }

    fn __repr__(&self) -> String {
        format!("INI({:?})", self.path())
    }
}
