//! Python `Pattern`, `Match` and the `finditer` iterator.
//!
//! A `Match` owns a shared copy of its subject and the byte spans the engine
//! reported; group values are sliced out when Python asks for them.

use std::sync::Arc;

use linre::Span;
use log::warn;
use pyo3::exceptions::{PyIndexError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyList, PyTuple};

use crate::convert::{
    self, ignore_method_flags, map_error, Anchor, CallbackError, SharedSubject, Spans,
    Subject,
};

/// A compiled pattern.
#[pyclass(frozen, name = "Pattern", module = "linre_crust")]
pub struct PyPattern {
    inner: linre::Pattern,
    source: PyObject,
    flags: u32,
}

impl PyPattern {
    pub fn compile(source: &Bound<'_, PyAny>, flags: u32, compat_comment: bool) -> PyResult<Self> {
        let pattern: Subject = source.extract()?;
        let inner = convert::compile(&pattern, flags, compat_comment).map_err(map_error)?;
        Ok(Self {
            inner,
            source: source.clone().unbind(),
            flags,
        })
    }

    fn single(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        anchor: Anchor,
    ) -> PyResult<Option<PyMatch>> {
        let subject: Subject = string.extract()?;
        let spans = subject.find(&slf.get().inner, anchor).map_err(map_error)?;
        Ok(spans.map(|spans| PyMatch {
            subject: Arc::new(SharedSubject::new(subject)),
            string: string.clone().unbind(),
            spans,
            re: slf.clone().unbind(),
        }))
    }
}

#[pymethods]
impl PyPattern {
    #[getter]
    fn pattern(&self, py: Python<'_>) -> PyObject {
        self.source.clone_ref(py)
    }

    #[getter]
    fn flags(&self) -> u32 {
        self.flags
    }

    /// Number of capturing groups.
    #[getter]
    fn groups(&self) -> usize {
        self.inner.groups()
    }

    /// First match anywhere in `string`, or `None`.
    #[pyo3(signature = (string, flags = 0))]
    pub(crate) fn search(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        flags: u32,
    ) -> PyResult<Option<PyMatch>> {
        ignore_method_flags("search", flags);
        Self::single(slf, string, Anchor::Search)
    }

    /// Match starting at the beginning of `string`, or `None`.
    #[pyo3(name = "match", signature = (string, flags = 0))]
    pub(crate) fn match_(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        flags: u32,
    ) -> PyResult<Option<PyMatch>> {
        ignore_method_flags("match", flags);
        Self::single(slf, string, Anchor::Start)
    }

    /// Match covering all of `string`, or `None`.
    #[pyo3(signature = (string, flags = 0))]
    pub(crate) fn fullmatch(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        flags: u32,
    ) -> PyResult<Option<PyMatch>> {
        ignore_method_flags("fullmatch", flags);
        Self::single(slf, string, Anchor::Both)
    }

    /// All non-overlapping matches: the whole match without groups, the
    /// group with one, a tuple of groups with more. Unset groups are empty.
    #[pyo3(signature = (string, flags = 0))]
    pub(crate) fn findall(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        flags: u32,
    ) -> PyResult<Py<PyList>> {
        ignore_method_flags("findall", flags);
        let py = slf.py();
        let subject: Subject = string.extract()?;
        let all = subject.find_all(&slf.get().inner).map_err(map_error)?;

        let items = all
            .iter()
            .map(|spans| findall_item(py, &subject, spans))
            .collect::<PyResult<Vec<_>>>()?;
        Ok(PyList::new(py, items)?.unbind())
    }

    /// Iterator of `Match` objects over all non-overlapping matches.
    #[pyo3(signature = (string, flags = 0))]
    pub(crate) fn finditer(
        slf: &Bound<'_, Self>,
        string: &Bound<'_, PyAny>,
        flags: u32,
    ) -> PyResult<MatchIter> {
        ignore_method_flags("finditer", flags);
        let subject: Subject = string.extract()?;
        let all = subject.find_all(&slf.get().inner).map_err(map_error)?;
        Ok(MatchIter {
            subject: Arc::new(SharedSubject::new(subject)),
            string: string.clone().unbind(),
            re: slf.clone().unbind(),
            remaining: all.into_iter(),
        })
    }

    /// Replaces every match with `repl`: a template using `\0`-`\9`, or a
    /// callable taking a `Match` and returning the replacement.
    ///
    /// `count` is accepted and ignored; every match is replaced.
    #[pyo3(signature = (repl, string, count = 0, flags = 0))]
    pub(crate) fn sub(
        slf: &Bound<'_, Self>,
        repl: &Bound<'_, PyAny>,
        string: &Bound<'_, PyAny>,
        count: usize,
        flags: u32,
    ) -> PyResult<PyObject> {
        ignore_method_flags("sub", flags);
        if count != 0 {
            warn!("sub: count={count} is not supported; replacing every match");
        }
        let subject: Subject = string.extract()?;
        if repl.is_callable() {
            sub_callback(slf, repl, string, subject)
        } else {
            sub_template(slf, repl, subject)
        }
    }

    fn __repr__(&self, py: Python<'_>) -> PyResult<String> {
        let source = self.source.bind(py).repr()?;
        Ok(format!("linre_crust.compile({source}, {})", self.flags))
    }
}

fn findall_item(py: Python<'_>, subject: &Subject, spans: &[Option<Span>]) -> PyResult<PyObject> {
    match spans {
        [] | [_] => Ok(subject.slice_object(py, spans.first().copied().flatten())),
        [_, group] => Ok(subject.slice_object(py, *group)),
        [_, groups @ ..] => {
            let items = groups.iter().map(|span| subject.slice_object(py, *span));
            Ok(PyTuple::new(py, items)?.into_any().unbind())
        }
    }
}

fn sub_template(
    slf: &Bound<'_, PyPattern>,
    repl: &Bound<'_, PyAny>,
    subject: Subject,
) -> PyResult<PyObject> {
    let py = slf.py();
    let re = &slf.get().inner;
    let rewrite: Subject = repl.extract()?;
    match (&rewrite, &subject) {
        (Subject::Text(rewrite), Subject::Text(text)) => {
            let out = re.sub(rewrite.as_str(), text.as_str()).map_err(map_error)?;
            Ok(out.into_pyobject(py)?.into_any().unbind())
        }
        (Subject::Bytes(rewrite), Subject::Bytes(bytes)) => {
            let out = re.sub(rewrite.as_slice(), bytes.as_slice()).map_err(map_error)?;
            Ok(PyBytes::new(py, &out).into_any().unbind())
        }
        _ => Err(PyTypeError::new_err(format!(
            "cannot use a {} template on a {} subject",
            rewrite.kind(),
            subject.kind()
        ))),
    }
}

fn sub_callback(
    slf: &Bound<'_, PyPattern>,
    repl: &Bound<'_, PyAny>,
    string: &Bound<'_, PyAny>,
    subject: Subject,
) -> PyResult<PyObject> {
    let py = slf.py();
    let re = &slf.get().inner;
    let shared = Arc::new(SharedSubject::new(subject));
    let to_python = |spans: &[Option<Span>]| PyMatch {
        subject: Arc::clone(&shared),
        string: string.clone().unbind(),
        spans: spans.to_vec(),
        re: slf.clone().unbind(),
    };

    match &**shared {
        Subject::Text(text) => {
            let out = re.try_sub_with(
                |m| -> Result<String, CallbackError> {
                    Ok(repl.call1((to_python(m.spans()),))?.extract::<String>()?)
                },
                text.as_str(),
            )?;
            Ok(out.into_pyobject(py)?.into_any().unbind())
        }
        Subject::Bytes(bytes) => {
            let out = re.try_sub_with(
                |m| -> Result<Vec<u8>, CallbackError> {
                    let replacement = repl.call1((to_python(m.spans()),))?;
                    Ok(replacement.downcast::<PyBytes>().map_err(PyErr::from)?.as_bytes().to_vec())
                },
                bytes.as_slice(),
            )?;
            Ok(PyBytes::new(py, &out).into_any().unbind())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Match
// ═══════════════════════════════════════════════════════════════════════════════

/// One match. Offsets are characters for `str` subjects and bytes for
/// `bytes` subjects; `-1` marks a group that did not participate.
#[pyclass(frozen, name = "Match", module = "linre_crust")]
pub struct PyMatch {
    subject: Arc<SharedSubject>,
    string: PyObject,
    spans: Spans,
    re: Py<PyPattern>,
}

impl PyMatch {
    fn span_at(&self, group: isize) -> PyResult<Option<Span>> {
        usize::try_from(group)
            .ok()
            .and_then(|index| self.spans.get(index))
            .copied()
            .ok_or_else(|| PyIndexError::new_err(format!("no such group: {group}")))
    }

    fn group_object(&self, py: Python<'_>, group: isize) -> PyResult<PyObject> {
        Ok(match self.span_at(group)? {
            Some(span) => self.subject.slice_object(py, Some(span)),
            None => py.None(),
        })
    }
}

#[pymethods]
impl PyMatch {
    /// `group()` is the whole match, `group(n)` one group, `group(a, b, ...)`
    /// a tuple. A group that did not participate is `None`.
    #[pyo3(signature = (*groups))]
    fn group(&self, py: Python<'_>, groups: &Bound<'_, PyTuple>) -> PyResult<PyObject> {
        match groups.len() {
            0 => self.group_object(py, 0),
            1 => self.group_object(py, groups.get_item(0)?.extract()?),
            _ => {
                let items = groups
                    .iter()
                    .map(|group| self.group_object(py, group.extract()?))
                    .collect::<PyResult<Vec<_>>>()?;
                Ok(PyTuple::new(py, items)?.into_any().unbind())
            }
        }
    }

    /// All groups from 1 up, with `default` for groups that did not
    /// participate.
    #[pyo3(signature = (default = None))]
    fn groups(&self, py: Python<'_>, default: Option<PyObject>) -> PyResult<Py<PyTuple>> {
        let items = self.spans.iter().skip(1).map(|span| match span {
            Some(span) => self.subject.slice_object(py, Some(*span)),
            None => default.as_ref().map_or_else(|| py.None(), |d| d.clone_ref(py)),
        });
        Ok(PyTuple::new(py, items)?.unbind())
    }

    #[pyo3(signature = (group = 0))]
    fn start(&self, group: isize) -> PyResult<isize> {
        Ok(self.subject.python_span(self.span_at(group)?).0)
    }

    #[pyo3(signature = (group = 0))]
    fn end(&self, group: isize) -> PyResult<isize> {
        Ok(self.subject.python_span(self.span_at(group)?).1)
    }

    #[pyo3(signature = (group = 0))]
    fn span(&self, group: isize) -> PyResult<(isize, isize)> {
        Ok(self.subject.python_span(self.span_at(group)?))
    }

    #[getter]
    fn string(&self, py: Python<'_>) -> PyObject {
        self.string.clone_ref(py)
    }

    #[getter]
    fn re(&self, py: Python<'_>) -> Py<PyPattern> {
        self.re.clone_ref(py)
    }

    fn __getitem__(&self, py: Python<'_>, group: isize) -> PyResult<PyObject> {
        self.group_object(py, group)
    }

    fn __repr__(&self, py: Python<'_>) -> PyResult<String> {
        let (start, end) = self.span(0)?;
        let whole = self.group_object(py, 0)?;
        Ok(format!(
            "<linre_crust.Match object; span=({start}, {end}), match={}>",
            whole.bind(py).repr()?
        ))
    }
}

/// Iterator returned by `finditer`. The engine's batch is already released;
/// the iterator holds only spans.
#[pyclass(name = "MatchIter", module = "linre_crust")]
pub struct MatchIter {
    subject: Arc<SharedSubject>,
    string: PyObject,
    re: Py<PyPattern>,
    remaining: std::vec::IntoIter<Spans>,
}

#[pymethods]
impl MatchIter {
    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __next__(mut slf: PyRefMut<'_, Self>) -> Option<PyMatch> {
        let spans = slf.remaining.next()?;
        let py = slf.py();
        Some(PyMatch {
            subject: Arc::clone(&slf.subject),
            string: slf.string.clone_ref(py),
            spans,
            re: slf.re.clone_ref(py),
        })
    }
}
