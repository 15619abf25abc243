//! Conversion between Python values and linre types.
//!
//! Subjects, patterns and templates come in as `str` or `bytes` and are copied
//! into Rust-owned buffers; matches go back out as byte spans that are turned
//! into Python offsets lazily. Errors map onto the exception hierarchy the
//! `re` module uses.

use std::ops::Deref;
use std::sync::OnceLock;

use linre::{CompileOptions, Error, Flags, Haystack, Pattern, Span};
use log::debug;
use pyo3::create_exception;
use pyo3::exceptions::{
    PyOverflowError, PyRuntimeError, PyTypeError, PyUnicodeError, PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyString};

create_exception!(
    linre_crust,
    PatternError,
    PyValueError,
    "Raised when a pattern or rewrite template is rejected."
);

/// Spans of one match, group 0 first.
pub type Spans = Vec<Option<Span>>;

/// A subject, pattern or template, owned on the Rust side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Text(String),
    Bytes(Vec<u8>),
}

impl<'py> FromPyObject<'py> for Subject {
    fn extract_bound(ob: &Bound<'py, PyAny>) -> PyResult<Self> {
        if let Ok(text) = ob.downcast::<PyString>() {
            return Ok(Self::Text(text.to_str()?.to_owned()));
        }
        if let Ok(bytes) = ob.downcast::<PyBytes>() {
            return Ok(Self::Bytes(bytes.as_bytes().to_vec()));
        }
        Err(PyTypeError::new_err(format!(
            "expected str or bytes, got {}",
            ob.get_type().name()?
        )))
    }
}

impl Subject {
    /// The slice of the subject under `span`, as `str` or `bytes`.
    ///
    /// An unset group becomes an empty value of the subject's type.
    pub fn slice_object(&self, py: Python<'_>, span: Option<Span>) -> PyObject {
        let range = span.map_or(0..0, Span::range);
        match self {
            Self::Text(text) => {
                PyString::new(py, text.get(range).unwrap_or_default()).into_any().unbind()
            }
            Self::Bytes(bytes) => {
                PyBytes::new(py, bytes.get(range).unwrap_or_default()).into_any().unbind()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "str",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// A subject shared by the matches made on it.
///
/// Character offsets are looked up in an index of character starts, built
/// on first use, so each lookup costs a binary search instead of a scan.
#[derive(Debug)]
pub struct SharedSubject {
    subject: Subject,
    // `None` when byte offsets already are Python offsets: bytes, or ASCII
    // text.
    char_starts: OnceLock<Option<Vec<usize>>>,
}

impl SharedSubject {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            char_starts: OnceLock::new(),
        }
    }

    /// Converts a byte offset into the offset Python reports: characters for
    /// text, bytes for bytes.
    pub fn python_offset(&self, byte: usize) -> usize {
        let starts = self.char_starts.get_or_init(|| match &self.subject {
            Subject::Text(text) if !text.is_ascii() => {
                Some(text.char_indices().map(|(start, _)| start).collect())
            }
            _ => None,
        });
        starts
            .as_deref()
            .map_or(byte, |starts| starts.partition_point(|&start| start < byte))
    }

    /// `(start, end)` in Python offsets, `(-1, -1)` for an unset group.
    pub fn python_span(&self, span: Option<Span>) -> (isize, isize) {
        let offset = |byte| isize::try_from(self.python_offset(byte)).unwrap_or(isize::MAX);
        span.map_or((-1, -1), |span| (offset(span.start), offset(span.end)))
    }
}

impl Deref for SharedSubject {
    type Target = Subject;

    fn deref(&self) -> &Subject {
        &self.subject
    }
}

/// Compile options from the flag word Python passes.
pub fn compile_options(flags: u32, compat_comment: bool) -> CompileOptions {
    CompileOptions::new()
        .flags(Flags::from_bits(flags))
        .compat_comment(compat_comment)
}

pub fn compile(pattern: &Subject, flags: u32, compat_comment: bool) -> Result<Pattern, Error> {
    let options = compile_options(flags, compat_comment);
    match pattern {
        Subject::Text(text) => Pattern::with_options(text, options),
        Subject::Bytes(bytes) => Pattern::from_bytes(bytes, options),
    }
}

/// Flags passed to a match method are accepted and ignored.
pub fn ignore_method_flags(method: &str, flags: u32) {
    if flags != 0 {
        debug!("{method}: flags {flags:#x} ignored; flags apply at compile time");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a single match has to sit in the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Search,
    Start,
    Both,
}

/// Runs one match and keeps only its spans, so the result outlives the
/// borrowed subject.
pub fn find<H: Haystack + ?Sized>(
    re: &Pattern,
    subject: &H,
    anchor: Anchor,
) -> Result<Option<Spans>, Error> {
    let found = match anchor {
        Anchor::Search => re.search(subject)?,
        Anchor::Start => re.prefix_match(subject)?,
        Anchor::Both => re.full_match(subject)?,
    };
    Ok(found.map(|m| m.spans().to_vec()))
}

/// Spans of every non-overlapping match.
pub fn find_all<H: Haystack + ?Sized>(re: &Pattern, subject: &H) -> Result<Vec<Spans>, Error> {
    re.finditer(subject)?
        .map(|m| m.map(|m| m.spans().to_vec()))
        .collect()
}

impl Subject {
    pub fn find(&self, re: &Pattern, anchor: Anchor) -> Result<Option<Spans>, Error> {
        match self {
            Self::Text(text) => find(re, text.as_str(), anchor),
            Self::Bytes(bytes) => find(re, bytes.as_slice(), anchor),
        }
    }

    pub fn find_all(&self, re: &Pattern) -> Result<Vec<Spans>, Error> {
        match self {
            Self::Text(text) => find_all(re, text.as_str()),
            Self::Bytes(bytes) => find_all(re, bytes.as_slice()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps a linre error onto a Python exception.
pub fn map_error(err: Error) -> PyErr {
    let message = err.to_string();
    match err {
        Error::Compile { .. } | Error::BudgetExceeded { .. } | Error::InvalidRewrite { .. } => {
            PatternError::new_err(message)
        }
        Error::Encoding { .. } => PyUnicodeError::new_err(message),
        Error::SubjectTooLarge { .. } => PyOverflowError::new_err(message),
        Error::MalformedResult { .. } => PyRuntimeError::new_err(message),
    }
}

/// Error type for callback substitution: whatever the Python callback
/// raised, or a linre error already mapped.
pub struct CallbackError(pub PyErr);

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        Self(map_error(err))
    }
}

impl From<PyErr> for CallbackError {
    fn from(err: PyErr) -> Self {
        Self(err)
    }
}

impl From<CallbackError> for PyErr {
    fn from(err: CallbackError) -> Self {
        err.0
    }
}
