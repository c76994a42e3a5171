use std::collections::BTreeMap;

use pyo3::exceptions::{PyAttributeError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple, PyType};

use super::attach;

/// Libraries folded into the startup bundle: core runtime, collections, data access
pub const BASELINE_LIBRARIES: &[&str] = &["builtins", "collections", "sqlite3"];

/// Public type objects a library defines (or defines in one of its submodules).
///
/// Every attribute that cannot be read is a loader failure; any failure
/// rejects the whole library.
pub fn exported_types<'py>(
    library: &Bound<'py, PyModule>,
) -> Result<Vec<(String, Bound<'py, PyAny>)>, Vec<String>> {
    let module_name = library
        .name()
        .map_err(|err| vec![err.to_string()])?
        .to_string();
    let names = library.dir().map_err(|err| vec![err.to_string()])?;

    let mut types = Vec::new();
    let mut failures = Vec::new();
    for name in names.iter() {
        let Ok(name) = name.extract::<String>() else {
            continue;
        };
        if name.starts_with('_') {
            continue;
        }
        match library.getattr(name.as_str()) {
            Ok(value) if defined_in(&value, &module_name) => types.push((name, value)),
            Ok(_) => {}
            Err(err) => failures.push(format!("{name}: {err}")),
        }
    }

    if failures.is_empty() {
        Ok(types)
    } else {
        Err(failures)
    }
}

fn defined_in(value: &Bound<PyAny>, module_name: &str) -> bool {
    if !value.is_instance_of::<PyType>() {
        return false;
    }
    value
        .getattr("__module__")
        .and_then(|owner| owner.extract::<String>())
        .is_ok_and(|owner| {
            owner == module_name
                || owner
                    .strip_prefix(module_name)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
}

/// A bundle of host types gathered from one or more libraries.
///
/// Scripts reach types by short name (`LY.OrderedDict`) or by qualified
/// name (`LY.get("collections.OrderedDict")`).
#[pyclass(name = "TypeCollection", module = "lychen")]
#[derive(Default)]
pub struct TypeCollection {
    types: BTreeMap<String, Py<PyAny>>,
    qualified: BTreeMap<String, Py<PyAny>>,
    libraries: Vec<String>,
}

impl TypeCollection {
    /// Add every exported type of `library`; returns how many were added
    pub fn fold(&mut self, library: &Bound<PyModule>) -> Result<usize, Vec<String>> {
        let module_name = library
            .name()
            .map_err(|err| vec![err.to_string()])?
            .to_string();
        let exported = exported_types(library)?;
        let count = exported.len();
        for (name, value) in exported {
            self.qualified
                .insert(format!("{module_name}.{name}"), value.clone().unbind());
            self.types.insert(name, value.unbind());
        }
        self.libraries.push(module_name);
        Ok(count)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.types.contains_key(name) || self.qualified.contains_key(name)
    }
}

#[pymethods]
impl TypeCollection {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    /// Fold another library (module object or identity string) into the bundle
    fn add_library(&mut self, py: Python, library: &Bound<PyAny>) -> PyResult<usize> {
        let module = match library.cast::<PyModule>() {
            Ok(module) => module.clone(),
            Err(_) => attach::resolve_library(py, &library.extract::<String>()?)?,
        };
        let library_name = module.name()?.to_string();
        self.fold(&module).map_err(|failures| {
            PyErr::from(attach::AttachError::TypeLoad {
                library: library_name,
                failures,
            })
        })
    }

    fn get(&self, py: Python, name: &str) -> Option<Py<PyAny>> {
        self.qualified
            .get(name)
            .or_else(|| self.types.get(name))
            .map(|value| value.clone_ref(py))
    }

    fn names(&self) -> Vec<String> {
        self.type_names()
    }

    fn libraries(&self) -> Vec<String> {
        self.libraries.clone()
    }

    fn __getattr__(&self, py: Python, name: &str) -> PyResult<Py<PyAny>> {
        self.types
            .get(name)
            .map(|value| value.clone_ref(py))
            .ok_or_else(|| PyAttributeError::new_err(format!("no host type named '{name}'")))
    }

    fn __contains__(&self, name: &str) -> bool {
        self.contains_type(name)
    }

    fn __len__(&self) -> usize {
        self.types.len()
    }

    fn __dir__(&self) -> Vec<String> {
        self.type_names()
    }

    fn __repr__(&self) -> String {
        format!(
            "TypeCollection(libraries={:?}, types={})",
            self.libraries,
            self.types.len()
        )
    }
}

/// Mutable cell handed to host APIs that fill in a value
#[pyclass(name = "HostVariable", module = "lychen")]
pub struct HostVariable {
    #[pyo3(get, set)]
    value: Py<PyAny>,
}

#[pymethods]
impl HostVariable {
    fn __repr__(&self, py: Python) -> PyResult<String> {
        Ok(format!("HostVariable({})", self.value.bind(py).repr()?))
    }
}

/// Adapter turning a script callable into a fixed-arity host delegate
#[pyclass(name = "Delegate", module = "lychen", frozen)]
pub struct HostDelegate {
    target: Py<PyAny>,
    arity: Option<usize>,
    returns_value: bool,
}

#[pymethods]
impl HostDelegate {
    #[pyo3(signature = (*args))]
    fn __call__(&self, py: Python, args: &Bound<PyTuple>) -> PyResult<Py<PyAny>> {
        if let Some(arity) = self.arity
            && args.len() != arity
        {
            return Err(PyTypeError::new_err(format!(
                "delegate takes {arity} arguments ({} given)",
                args.len()
            )));
        }
        let result = self.target.call1(py, args.clone())?;
        if self.returns_value {
            Ok(result)
        } else {
            Ok(py.None())
        }
    }

    #[getter]
    fn arity(&self) -> Option<usize> {
        self.arity
    }
}

/// Helpers for building host values from script code
#[pyclass(name = "HostFunctions", module = "lychen", frozen)]
pub struct HostFunctions;

#[pymethods]
impl HostFunctions {
    #[pyo3(signature = (cls, *args, **kwargs))]
    fn new_obj(
        &self,
        cls: &Bound<PyAny>,
        args: &Bound<PyTuple>,
        kwargs: Option<&Bound<PyDict>>,
    ) -> PyResult<Py<PyAny>> {
        Ok(cls.call(args.clone(), kwargs)?.unbind())
    }

    #[pyo3(signature = (length, fill = None))]
    fn new_arr(&self, py: Python, length: usize, fill: Option<Py<PyAny>>) -> Vec<Py<PyAny>> {
        let fill = fill.unwrap_or_else(|| py.None());
        (0..length).map(|_| fill.clone_ref(py)).collect()
    }

    #[pyo3(signature = (value = None))]
    fn new_var(&self, py: Python, value: Option<Py<PyAny>>) -> HostVariable {
        HostVariable {
            value: value.unwrap_or_else(|| py.None()),
        }
    }

    /// Delegate whose result is handed back to the caller
    #[pyo3(signature = (target, arity = None))]
    fn func(&self, target: Bound<PyAny>, arity: Option<usize>) -> PyResult<HostDelegate> {
        delegate(target, arity, true)
    }

    /// Delegate whose result is discarded
    #[pyo3(name = "proc", signature = (target, arity = None))]
    fn proc_(&self, target: Bound<PyAny>, arity: Option<usize>) -> PyResult<HostDelegate> {
        delegate(target, arity, false)
    }

    fn is_null(&self, value: &Bound<PyAny>) -> bool {
        value.is_none()
    }

    fn is_type(&self, value: &Bound<PyAny>, cls: &Bound<PyAny>) -> PyResult<bool> {
        value.is_instance(cls)
    }

    fn as_type(&self, py: Python, value: &Bound<PyAny>, cls: &Bound<PyAny>) -> PyResult<Py<PyAny>> {
        if value.is_instance(cls)? {
            Ok(value.clone().unbind())
        } else {
            Ok(py.None())
        }
    }

    fn to_int(&self, py: Python, value: &Bound<PyAny>) -> PyResult<i64> {
        py.import("builtins")?
            .getattr("int")?
            .call1((value,))?
            .extract()
    }

    fn to_float(&self, py: Python, value: &Bound<PyAny>) -> PyResult<f64> {
        py.import("builtins")?
            .getattr("float")?
            .call1((value,))?
            .extract()
    }
}

fn delegate(target: Bound<PyAny>, arity: Option<usize>, returns_value: bool) -> PyResult<HostDelegate> {
    if !target.is_callable() {
        return Err(PyTypeError::new_err("delegate target must be callable"));
    }
    Ok(HostDelegate {
        target: target.unbind(),
        arity,
        returns_value,
    })
}

/// Helpers that reach further into the host: type lookup, libraries, enums, generics
#[pyclass(name = "ExtendedHostFunctions", module = "lychen", frozen)]
pub struct ExtendedHostFunctions;

#[pymethods]
impl ExtendedHostFunctions {
    /// Resolve a dotted type name, e.g. `collections.OrderedDict`; bare names are builtins
    #[pyo3(name = "type")]
    fn type_(&self, py: Python, name: &str) -> PyResult<Py<PyAny>> {
        let (module, attr) = name.rsplit_once('.').unwrap_or(("builtins", name));
        let value = py.import(module)?.getattr(attr)?;
        if !value.is_instance_of::<PyType>() {
            return Err(PyTypeError::new_err(format!("'{name}' is not a type")));
        }
        Ok(value.unbind())
    }

    /// Build a fresh type collection from the given library identities
    #[pyo3(signature = (*libraries))]
    fn lib(&self, py: Python, libraries: Vec<String>) -> PyResult<TypeCollection> {
        let mut bundle = TypeCollection::default();
        for identifier in libraries {
            let module = attach::resolve_library(py, &identifier)?;
            bundle
                .fold(&module)
                .map_err(|failures| attach::AttachError::TypeLoad {
                    library: identifier.clone(),
                    failures,
                })?;
        }
        Ok(bundle)
    }

    /// Members of an enumeration type, in definition order
    fn enum_values(&self, cls: &Bound<PyAny>) -> PyResult<Vec<Py<PyAny>>> {
        cls.try_iter()?
            .map(|member| member.map(Bound::unbind))
            .collect()
    }

    /// Instantiate a parameterized generic, e.g. `new_generic(list, int, [1, 2])`
    #[pyo3(signature = (cls, type_args, *args))]
    fn new_generic(
        &self,
        cls: &Bound<PyAny>,
        type_args: &Bound<PyAny>,
        args: &Bound<PyTuple>,
    ) -> PyResult<Py<PyAny>> {
        Ok(cls.get_item(type_args)?.call1(args.clone())?.unbind())
    }
}
