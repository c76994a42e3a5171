use pyo3::exceptions::{PyKeyError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyInt, PyIterator, PyList, PyString};

use crate::settings::{SettingValue, SharedSettings};

/// Convert a Python object to a SettingValue with strict type checking (no coercion)
fn py_to_setting(obj: &Bound<PyAny>) -> PyResult<SettingValue> {
    // bool is a subclass of int in Python, so it has to be checked first
    if obj.is_instance_of::<PyBool>() {
        return Ok(SettingValue::Bool(obj.extract::<bool>()?));
    }

    if obj.is_instance_of::<PyInt>() {
        return Ok(SettingValue::Integer(obj.extract::<i64>()?));
    }

    if obj.is_instance_of::<PyString>() {
        return Ok(SettingValue::Text(obj.extract::<String>()?));
    }

    if obj.is_instance_of::<PyList>()
        && let Ok(items) = obj.extract::<Vec<String>>()
    {
        return Ok(SettingValue::List(items));
    }

    Err(PyTypeError::new_err(
        "Setting values must be bool, int, str, or a list of str",
    ))
}

fn setting_to_py(py: Python, value: &SettingValue) -> PyResult<Py<PyAny>> {
    match value {
        SettingValue::Bool(b) => Ok((*b).into_pyobject(py)?.to_owned().into_any().unbind()),
        SettingValue::Text(s) => Ok(s.clone().into_pyobject(py)?.into_any().unbind()),
        SettingValue::Integer(i) => Ok((*i).into_pyobject(py)?.into_any().unbind()),
        SettingValue::List(items) => Ok(PyList::new(py, items)?.into_any().unbind()),
    }
}

/// Dictionary-like view of the shared settings map
#[pyclass(name = "Settings", module = "lychen", frozen)]
pub struct SettingsObject {
    settings: SharedSettings,
}

impl SettingsObject {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }

    fn lookup(&self, key: &str) -> Option<SettingValue> {
        self.settings.read().get(key).cloned()
    }
}

#[pymethods]
impl SettingsObject {
    fn __getitem__(&self, py: Python, key: &str) -> PyResult<Py<PyAny>> {
        match self.lookup(key) {
            Some(value) => setting_to_py(py, &value),
            None => Err(PyKeyError::new_err(format!("Key '{}' not found", key))),
        }
    }

    fn __setitem__(&self, key: String, value: Bound<PyAny>) -> PyResult<()> {
        let value = py_to_setting(&value)?;
        self.settings.write().set(key, value);
        Ok(())
    }

    fn __delitem__(&self, key: &str) -> PyResult<()> {
        match self.settings.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(PyKeyError::new_err(format!("Key '{}' not found", key))),
        }
    }

    fn __contains__(&self, key: &str) -> bool {
        self.settings.read().contains(key)
    }

    fn __len__(&self) -> usize {
        self.settings.read().len()
    }

    fn keys(&self) -> Vec<String> {
        self.settings.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Iterates over a snapshot of the keys, like a dict
    fn __iter__<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyIterator>> {
        PyList::new(py, self.keys())?.try_iter()
    }

    fn items(&self, py: Python) -> PyResult<Vec<(String, Py<PyAny>)>> {
        let entries: Vec<(String, SettingValue)> = self
            .settings
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(k, v)| Ok((k, setting_to_py(py, &v)?)))
            .collect()
    }

    #[pyo3(signature = (key, default = None))]
    fn get(&self, py: Python, key: &str, default: Option<Bound<PyAny>>) -> PyResult<Py<PyAny>> {
        match self.lookup(key) {
            Some(value) => setting_to_py(py, &value),
            None => match default {
                Some(d) => Ok(d.unbind()),
                None => Ok(py.None()),
            },
        }
    }

    fn __repr__(&self) -> String {
        let settings = self.settings.read();
        let body: Vec<String> = settings
            .iter()
            .map(|(k, v)| format!("{:?}: {:?}", k, v.to_string_repr()))
            .collect();
        format!("Settings({{{}}})", body.join(", "))
    }
}
