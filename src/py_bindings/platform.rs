//! Host types for file, console, path, directory, environment, string,
//! date/time and debugger access. Scripts call their static operations
//! directly on the bound type (`LYFile.exists("a.txt")`).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn sorted_entries(dir: &Path, want_dirs: bool) -> io::Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() == want_dirs {
            entries.push(display(&entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

#[pyclass(name = "File", module = "lychen", frozen)]
pub struct FileOps;

#[pymethods]
impl FileOps {
    #[staticmethod]
    fn exists(path: PathBuf) -> bool {
        path.is_file()
    }

    #[staticmethod]
    fn read_all_text(path: PathBuf) -> PyResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    #[staticmethod]
    fn read_all_lines(path: PathBuf) -> PyResult<Vec<String>> {
        Ok(fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    #[staticmethod]
    fn write_all_text(path: PathBuf, text: &str) -> PyResult<()> {
        Ok(fs::write(path, text)?)
    }

    #[staticmethod]
    fn append_all_text(path: PathBuf, text: &str) -> PyResult<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    #[staticmethod]
    #[pyo3(signature = (source, destination, overwrite = false))]
    fn copy(source: PathBuf, destination: PathBuf, overwrite: bool) -> PyResult<()> {
        if !overwrite && destination.exists() {
            return Err(PyErr::from(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            )));
        }
        fs::copy(source, destination)?;
        Ok(())
    }

    #[staticmethod]
    #[pyo3(name = "move")]
    fn move_(source: PathBuf, destination: PathBuf) -> PyResult<()> {
        Ok(fs::rename(source, destination)?)
    }

    #[staticmethod]
    fn delete(path: PathBuf) -> PyResult<()> {
        match fs::remove_file(path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[pyclass(name = "Console", module = "lychen", frozen)]
pub struct ConsoleOps;

#[pymethods]
impl ConsoleOps {
    #[staticmethod]
    fn write(value: &Bound<PyAny>) -> PyResult<()> {
        let mut out = io::stdout().lock();
        write!(out, "{}", value.str()?)?;
        out.flush()?;
        Ok(())
    }

    #[staticmethod]
    #[pyo3(signature = (value = None))]
    fn write_line(value: Option<&Bound<PyAny>>) -> PyResult<()> {
        match value {
            Some(value) => println!("{}", value.str()?),
            None => println!(),
        }
        Ok(())
    }

    #[staticmethod]
    fn error(value: &Bound<PyAny>) -> PyResult<()> {
        eprintln!("{}", value.str()?);
        Ok(())
    }

    /// One line from stdin without its terminator, or None at end of input
    #[staticmethod]
    fn read_line() -> PyResult<Option<String>> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(Some(line))
    }
}

#[pyclass(name = "Path", module = "lychen", frozen)]
pub struct PathOps;

#[pymethods]
impl PathOps {
    #[staticmethod]
    #[pyo3(signature = (*parts))]
    fn combine(parts: Vec<PathBuf>) -> String {
        let joined: PathBuf = parts.iter().collect();
        display(&joined)
    }

    #[staticmethod]
    fn get_file_name(path: PathBuf) -> Option<String> {
        path.file_name().map(|name| name.to_string_lossy().into_owned())
    }

    #[staticmethod]
    fn get_file_name_without_extension(path: PathBuf) -> Option<String> {
        path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
    }

    /// Extension including its leading dot, or "" when there is none
    #[staticmethod]
    fn get_extension(path: PathBuf) -> String {
        path.extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    #[staticmethod]
    fn change_extension(path: PathBuf, extension: &str) -> String {
        display(&path.with_extension(extension.trim_start_matches('.')))
    }

    #[staticmethod]
    fn get_directory_name(path: PathBuf) -> Option<String> {
        path.parent().map(display)
    }

    #[staticmethod]
    fn get_full_path(path: PathBuf) -> PyResult<String> {
        Ok(display(&std::path::absolute(path)?))
    }

    #[staticmethod]
    fn get_temp_path() -> String {
        display(&std::env::temp_dir())
    }

    #[staticmethod]
    fn is_rooted(path: PathBuf) -> bool {
        path.has_root()
    }
}

#[pyclass(name = "Directory", module = "lychen", frozen)]
pub struct DirectoryOps;

#[pymethods]
impl DirectoryOps {
    #[staticmethod]
    fn exists(path: PathBuf) -> bool {
        path.is_dir()
    }

    #[staticmethod]
    fn create(path: PathBuf) -> PyResult<()> {
        Ok(fs::create_dir_all(path)?)
    }

    #[staticmethod]
    #[pyo3(signature = (path, recursive = false))]
    fn delete(path: PathBuf, recursive: bool) -> PyResult<()> {
        if recursive {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_dir(path)?;
        }
        Ok(())
    }

    #[staticmethod]
    fn get_files(path: PathBuf) -> PyResult<Vec<String>> {
        Ok(sorted_entries(&path, false)?)
    }

    #[staticmethod]
    fn get_directories(path: PathBuf) -> PyResult<Vec<String>> {
        Ok(sorted_entries(&path, true)?)
    }

    #[staticmethod]
    fn get_current() -> PyResult<String> {
        Ok(display(&std::env::current_dir()?))
    }

    #[staticmethod]
    fn set_current(path: PathBuf) -> PyResult<()> {
        Ok(std::env::set_current_dir(path)?)
    }
}

/// A directory handle scripts can construct: `LYDirectoryInfo("logs")`
#[pyclass(name = "DirectoryInfo", module = "lychen", frozen)]
pub struct DirectoryInfo {
    path: PathBuf,
}

#[pymethods]
impl DirectoryInfo {
    #[new]
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[getter]
    fn name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    #[getter]
    fn full_name(&self) -> PyResult<String> {
        Ok(display(&std::path::absolute(&self.path)?))
    }

    #[getter]
    fn exists(&self) -> bool {
        self.path.is_dir()
    }

    #[getter]
    fn parent(&self) -> Option<DirectoryInfo> {
        self.path.parent().map(|parent| DirectoryInfo {
            path: parent.to_path_buf(),
        })
    }

    fn create(&self) -> PyResult<()> {
        Ok(fs::create_dir_all(&self.path)?)
    }

    fn files(&self) -> PyResult<Vec<String>> {
        Ok(sorted_entries(&self.path, false)?)
    }

    fn directories(&self) -> PyResult<Vec<String>> {
        Ok(sorted_entries(&self.path, true)?)
    }

    fn __repr__(&self) -> String {
        format!("DirectoryInfo({:?})", display(&self.path))
    }
}

#[pyclass(name = "Environment", module = "lychen", frozen)]
pub struct EnvironmentOps;

#[pymethods]
impl EnvironmentOps {
    #[staticmethod]
    fn get(name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    /// Set a variable for this process and its children; None removes it
    #[staticmethod]
    #[pyo3(signature = (name, value = None))]
    fn set(name: &str, value: Option<&str>) {
        // SAFETY: scripts only ever run on the host's single control thread
        unsafe {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }

    #[staticmethod]
    fn vars() -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    #[staticmethod]
    fn current_directory() -> PyResult<String> {
        Ok(display(&std::env::current_dir()?))
    }

    #[staticmethod]
    fn home_directory() -> Option<String> {
        home::home_dir()
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| display(&path))
    }

    #[staticmethod]
    fn machine_name() -> PyResult<String> {
        let name = nix::unistd::gethostname().map_err(io::Error::from)?;
        Ok(name.to_string_lossy().into_owned())
    }

    #[staticmethod]
    fn process_id() -> i32 {
        nix::unistd::getpid().as_raw()
    }

    #[staticmethod]
    fn command_line_args() -> Vec<String> {
        std::env::args().collect()
    }

    #[staticmethod]
    fn new_line() -> &'static str {
        "\n"
    }
}

#[pyclass(name = "String", module = "lychen", frozen)]
pub struct StringOps;

#[pymethods]
impl StringOps {
    #[staticmethod]
    fn is_null_or_empty(value: Option<&str>) -> bool {
        value.is_none_or(str::is_empty)
    }

    #[staticmethod]
    fn is_null_or_whitespace(value: Option<&str>) -> bool {
        value.is_none_or(|v| v.trim().is_empty())
    }

    #[staticmethod]
    fn join(separator: &str, items: Vec<String>) -> String {
        items.join(separator)
    }

    #[staticmethod]
    fn split(value: &str, separator: &str) -> Vec<String> {
        value.split(separator).map(str::to_string).collect()
    }

    #[staticmethod]
    #[pyo3(signature = (*parts))]
    fn concat(parts: Vec<String>) -> String {
        parts.concat()
    }

    #[staticmethod]
    #[pyo3(signature = (value, width, fill = ' '))]
    fn pad_left(value: &str, width: usize, fill: char) -> String {
        let missing = width.saturating_sub(value.chars().count());
        let mut padded: String = std::iter::repeat_n(fill, missing).collect();
        padded.push_str(value);
        padded
    }

    #[staticmethod]
    #[pyo3(signature = (value, width, fill = ' '))]
    fn pad_right(value: &str, width: usize, fill: char) -> String {
        let missing = width.saturating_sub(value.chars().count());
        let mut padded = value.to_string();
        padded.extend(std::iter::repeat_n(fill, missing));
        padded
    }

    #[staticmethod]
    fn equals_ignore_case(left: &str, right: &str) -> bool {
        left.to_lowercase() == right.to_lowercase()
    }
}

#[pyclass(name = "DateTime", module = "lychen", frozen)]
pub struct DateTimeOps;

#[pymethods]
impl DateTimeOps {
    /// Local time, RFC 3339
    #[staticmethod]
    fn now() -> String {
        Local::now().to_rfc3339()
    }

    #[staticmethod]
    fn utc_now() -> String {
        Utc::now().to_rfc3339()
    }

    #[staticmethod]
    fn today() -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }

    /// Current time rendered with a strftime pattern
    #[staticmethod]
    #[pyo3(signature = (pattern, utc = false))]
    fn format(pattern: &str, utc: bool) -> PyResult<String> {
        let mut rendered = String::new();
        let result = if utc {
            write!(rendered, "{}", Utc::now().format(pattern))
        } else {
            write!(rendered, "{}", Local::now().format(pattern))
        };
        result.map_err(|_| PyValueError::new_err(format!("invalid time format '{pattern}'")))?;
        Ok(rendered)
    }

    #[staticmethod]
    fn unix_timestamp() -> i64 {
        Utc::now().timestamp()
    }
}

#[pyclass(name = "Debugger", module = "lychen", frozen)]
pub struct DebuggerOps;

#[pymethods]
impl DebuggerOps {
    #[staticmethod]
    fn is_attached() -> bool {
        crate::debugger::is_attached()
    }

    #[staticmethod]
    fn launch() {
        crate::debugger::launch();
    }

    #[staticmethod]
    #[pyo3(name = "break_")]
    fn break_into() {
        crate::debugger::break_into();
    }
}

/// The host process itself
#[pyclass(name = "Process", module = "lychen", frozen)]
pub struct ProcessOps;

#[pymethods]
impl ProcessOps {
    #[staticmethod]
    fn pid() -> i32 {
        nix::unistd::getpid().as_raw()
    }

    #[staticmethod]
    fn executable() -> PyResult<String> {
        Ok(display(&std::env::current_exe()?))
    }

    #[staticmethod]
    fn arguments() -> Vec<String> {
        std::env::args().skip(1).collect()
    }

    #[staticmethod]
    fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Leave immediately with the given status
    #[staticmethod]
    fn exit(py: Python, code: i32) -> PyResult<()> {
        crate::py_bindings::Engine::flush_streams(py)?;
        io::stdout().flush()?;
        std::process::exit(code)
    }
}
