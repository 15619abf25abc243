//! linre-crust: Python bindings for linre via `PyO3`.
//!
//! A drop-in subset of the `re` module backed by the linear-time engine:
//! compile in Rust, match in Rust, spans out. Subjects may be `str` or
//! `bytes`; offsets on `str` subjects are in characters.
//!
//! ```python
//! import linre_crust as re
//!
//! p = re.compile(r"a(b+)")
//! p.sub(lambda m: m.group(1).upper(), "abbcdefabbbbca")  # 'aBBcdefaBBBBca'
//! ```
//!
//! Only `IGNORECASE` changes matching; the other flag constants are accepted
//! for compatibility and have no effect.

mod convert;
mod pattern;

use pyo3::prelude::*;

use convert::PatternError;
use pattern::{MatchIter, PyMatch, PyPattern};

/// Compiles `pattern` (`str` or `bytes`).
///
/// With `compat_comment`, `(?#...)` comments are stripped before compiling.
#[pyfunction]
#[pyo3(signature = (pattern, flags = 0, compat_comment = false))]
fn compile(pattern: &Bound<'_, PyAny>, flags: u32, compat_comment: bool) -> PyResult<PyPattern> {
    PyPattern::compile(pattern, flags, compat_comment)
}

// Module-level functions compile on every call; nothing is cached.

fn compiled<'py>(pattern: &Bound<'py, PyAny>, flags: u32) -> PyResult<Bound<'py, PyPattern>> {
    Bound::new(pattern.py(), PyPattern::compile(pattern, flags, false)?)
}

#[pyfunction]
#[pyo3(signature = (pattern, string, flags = 0))]
fn search(
    pattern: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    flags: u32,
) -> PyResult<Option<PyMatch>> {
    PyPattern::search(&compiled(pattern, flags)?, string, 0)
}

#[pyfunction(name = "match")]
#[pyo3(signature = (pattern, string, flags = 0))]
fn match_(
    pattern: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    flags: u32,
) -> PyResult<Option<PyMatch>> {
    PyPattern::match_(&compiled(pattern, flags)?, string, 0)
}

#[pyfunction]
#[pyo3(signature = (pattern, string, flags = 0))]
fn fullmatch(
    pattern: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    flags: u32,
) -> PyResult<Option<PyMatch>> {
    PyPattern::fullmatch(&compiled(pattern, flags)?, string, 0)
}

#[pyfunction]
#[pyo3(signature = (pattern, string, flags = 0))]
fn findall(
    pattern: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    flags: u32,
) -> PyResult<Py<pyo3::types::PyList>> {
    PyPattern::findall(&compiled(pattern, flags)?, string, 0)
}

#[pyfunction]
#[pyo3(signature = (pattern, string, flags = 0))]
fn finditer(
    pattern: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    flags: u32,
) -> PyResult<MatchIter> {
    PyPattern::finditer(&compiled(pattern, flags)?, string, 0)
}

#[pyfunction]
#[pyo3(signature = (pattern, repl, string, count = 0, flags = 0))]
fn sub(
    pattern: &Bound<'_, PyAny>,
    repl: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    count: usize,
    flags: u32,
) -> PyResult<PyObject> {
    PyPattern::sub(&compiled(pattern, flags)?, repl, string, count, 0)
}

/// Sets the memory budget, in bytes, for patterns compiled afterwards.
#[pyfunction]
fn set_max_memory_budget(bytes: usize) {
    linre::set_max_memory_budget(bytes);
}

/// Python module: `linre_crust`
#[pymodule]
fn linre_crust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPattern>()?;
    m.add_class::<PyMatch>()?;
    m.add_class::<MatchIter>()?;

    m.add_function(wrap_pyfunction!(compile, m)?)?;
    m.add_function(wrap_pyfunction!(search, m)?)?;
    m.add_function(wrap_pyfunction!(match_, m)?)?;
    m.add_function(wrap_pyfunction!(fullmatch, m)?)?;
    m.add_function(wrap_pyfunction!(findall, m)?)?;
    m.add_function(wrap_pyfunction!(finditer, m)?)?;
    m.add_function(wrap_pyfunction!(sub, m)?)?;
    m.add_function(wrap_pyfunction!(set_max_memory_budget, m)?)?;

    m.add("error", m.py().get_type::<PatternError>())?;

    for (names, flag) in [
        (["I", "IGNORECASE"], linre::Flags::IGNORECASE),
        (["L", "LOCALE"], linre::Flags::LOCALE),
        (["M", "MULTILINE"], linre::Flags::MULTILINE),
        (["S", "DOTALL"], linre::Flags::DOTALL),
        (["U", "UNICODE"], linre::Flags::UNICODE),
        (["X", "VERBOSE"], linre::Flags::VERBOSE),
    ] {
        for name in names {
            m.add(name, flag.bits())?;
        }
    }

    Ok(())
}
