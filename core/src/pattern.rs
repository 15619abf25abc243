//! Pattern handle: one compiled engine handle per [`Pattern`].

use std::borrow::Cow;
use std::ffi::CStr;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::ptr::NonNull;
use std::sync::Arc;

use log::{debug, trace};

use crate::engine::{self, LINRE_REGEX, LINRE_RESULT};
use crate::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// Flags
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile flags, with the bit values of Python's `re` module.
///
/// Only [`Flags::IGNORECASE`] changes how a pattern matches. The other bits
/// are accepted so callers written against `re` keep working, but they are
/// inert: `MULTILINE` does not make `^` match after newlines, `DOTALL` does
/// not make `.` match `\n`, `VERBOSE` does not strip whitespace. Use the
/// inline forms (`(?m)`, `(?s)`, `(?x)`) for those behaviors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u32);

impl Flags {
    /// Case-insensitive matching. Honored.
    pub const IGNORECASE: Self = Self(2);
    /// Inert.
    pub const LOCALE: Self = Self(4);
    /// Inert.
    pub const MULTILINE: Self = Self(8);
    /// Inert.
    pub const DOTALL: Self = Self(16);
    /// Inert. Patterns are always Unicode-aware.
    pub const UNICODE: Self = Self(32);
    /// Inert.
    pub const VERBOSE: Self = Self(64);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags from raw bits. Unknown bits are kept and ignored.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The bits of `self` that have no effect on matching.
    #[must_use]
    pub const fn inert(self) -> Self {
        Self(self.0 & !Self::IGNORECASE.0)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Options applied when compiling a [`Pattern`].
///
/// ```
/// use linre::{CompileOptions, Flags, Pattern};
///
/// let options = CompileOptions::new()
///     .flags(Flags::IGNORECASE)
///     .compat_comment(true);
/// let re = Pattern::with_options("a(?#one or more b)b+", options).unwrap();
/// assert_eq!(re.as_str(), "a(?#one or more b)b+");
/// assert!(re.is_match("ABB").unwrap());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CompileOptions {
    /// Compile flags. Only [`Flags::IGNORECASE`] is honored.
    pub flags: Flags,
    /// Remove `(?#...)` comment groups before compiling. The engine has no
    /// comment syntax of its own.
    pub compat_comment: bool,
}

impl CompileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Shorthand for adding or removing [`Flags::IGNORECASE`].
    #[must_use]
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        if yes {
            self.flags |= Flags::IGNORECASE;
        } else {
            self.flags = Flags(self.flags.0 & !Flags::IGNORECASE.0);
        }
        self
    }

    #[must_use]
    pub fn compat_comment(mut self, yes: bool) -> Self {
        self.compat_comment = yes;
        self
    }

    /// Whether the pattern will be compiled case-insensitively.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.flags.contains(Flags::IGNORECASE)
    }
}

/// Removes every `(?#...)` group, up to the first `)` after its opening.
/// An unterminated comment is left in place for the engine to reject.
fn strip_comments(source: &str) -> Cow<'_, str> {
    if !source.contains("(?#") {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(open) = rest.find("(?#") {
        let Some(close) = rest[open..].find(')') else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pattern
// ═══════════════════════════════════════════════════════════════════════════════

struct Handle {
    raw: NonNull<LINRE_REGEX>,
    source: String,
    options: CompileOptions,
    groups: usize,
}

// SAFETY: the engine handle is immutable after compilation and every
// matching entry point only reads it.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: `raw` came from `linre_new` and is owned by this handle.
        unsafe { engine::linre_delete(self.raw.as_ptr()) };
        trace!("released pattern handle {:?}", self.source);
    }
}

/// A compiled regular expression.
///
/// Construction fails instead of producing an unusable pattern, so every
/// `Pattern` can be matched against. Cloning is cheap and shares the engine
/// handle, which is released when the last clone goes away.
///
/// ```
/// use linre::Pattern;
///
/// let re = Pattern::new("a(b+)").unwrap();
/// let m = re.search("xabbc").unwrap().unwrap();
/// assert_eq!(m.group(0), Some("abb"));
/// assert_eq!(m.group(1), Some("bb"));
/// ```
#[derive(Clone)]
pub struct Pattern {
    inner: Arc<Handle>,
}

impl Pattern {
    /// Compiles `pattern` with default options.
    ///
    /// # Errors
    ///
    /// See [`Pattern::from_bytes`].
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Self::from_bytes(pattern.as_bytes(), CompileOptions::default())
    }

    /// Compiles `pattern` with `options`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::from_bytes`].
    pub fn with_options(pattern: &str, options: CompileOptions) -> Result<Self, Error> {
        Self::from_bytes(pattern.as_bytes(), options)
    }

    /// Compiles a pattern given as bytes. The bytes must be UTF-8.
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`] if `pattern` is not UTF-8.
    /// - [`Error::Compile`] if the engine rejects the pattern, including
    ///   look-around and backreferences it does not support.
    /// - [`Error::BudgetExceeded`] if the compiled pattern would not fit in
    ///   the memory budget (see [`set_max_memory_budget`](crate::set_max_memory_budget)).
    pub fn from_bytes(pattern: &[u8], options: CompileOptions) -> Result<Self, Error> {
        let source = std::str::from_utf8(pattern).map_err(|err| Error::Encoding {
            what: "pattern",
            offset: err.valid_up_to(),
        })?;
        let inert = options.flags.inert();
        if inert != Flags::empty() {
            debug!("ignoring inert flags {:#x} for {source:?}", inert.bits());
        }

        let compiled = if options.compat_comment {
            strip_comments(source)
        } else {
            Cow::Borrowed(source)
        };

        // SAFETY: `compiled` outlives the call; the engine copies what it
        // needs.
        let raw = unsafe {
            engine::linre_new(
                compiled.as_ptr(),
                compiled.len(),
                options.is_case_insensitive(),
            )
        };
        let raw = NonNull::new(raw).ok_or(Error::MalformedResult {
            reason: "null pattern handle",
        })?;
        let mut handle = Handle {
            raw,
            source: source.to_owned(),
            options,
            groups: 0,
        };

        // SAFETY: `raw` is a live handle; the message is copied before the
        // handle is dropped.
        unsafe {
            if !engine::linre_ok(raw.as_ptr()) {
                let message = CStr::from_ptr(engine::linre_error_msg(raw.as_ptr()))
                    .to_string_lossy()
                    .into_owned();
                let pattern = handle.source.clone();
                return Err(match engine::linre_error_code(raw.as_ptr()) {
                    LINRE_RESULT::MEMORY_BUDGET_EXCEEDED => {
                        Error::BudgetExceeded { pattern, message }
                    }
                    _ => Error::Compile { pattern, message },
                });
            }
            handle.groups = usize::try_from(engine::linre_num_groups(raw.as_ptr())).map_err(
                |_| Error::MalformedResult {
                    reason: "negative group count",
                },
            )?;
        }

        debug!(
            "compiled {:?}: {} groups, case_insensitive={}",
            handle.source,
            handle.groups,
            options.is_case_insensitive()
        );
        Ok(Self {
            inner: Arc::new(handle),
        })
    }

    /// The pattern as given, before comment stripping.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner.source
    }

    /// Number of capture groups, not counting the whole match.
    #[must_use]
    pub fn groups(&self) -> usize {
        self.inner.groups
    }

    #[must_use]
    pub fn options(&self) -> CompileOptions {
        self.inner.options
    }

    pub(crate) fn raw(&self) -> *const LINRE_REGEX {
        self.inner.raw.as_ptr()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.inner.source)
            .field("groups", &self.inner.groups)
            .field("flags", &self.inner.options.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::live_buffers;

    #[test]
    fn reports_groups_and_source() {
        let re = Pattern::new("a(b+)(?:c)(d)?").unwrap();
        assert_eq!(re.groups(), 2);
        assert_eq!(re.as_str(), "a(b+)(?:c)(d)?");
        assert_eq!(re.options(), CompileOptions::default());
    }

    #[test]
    fn unsupported_lookbehind_is_rejected() {
        let err = Pattern::new("(?<![xy])a").unwrap_err();
        match err {
            Error::Compile { pattern, message } => {
                assert_eq!(pattern, "(?<![xy])a");
                assert!(message.contains("look-around"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn non_utf8_pattern_is_an_encoding_error() {
        let err = Pattern::from_bytes(b"ab\xFF", CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            Error::Encoding {
                what: "pattern",
                offset: 2
            }
        );
    }

    #[test]
    fn comments_are_stripped_on_request() {
        assert_eq!(strip_comments("a(?#x)b(?#y)c"), "abc");
        assert_eq!(strip_comments("a(?#x"), "a(?#x");
        assert!(matches!(strip_comments("abc"), Cow::Borrowed("abc")));

        assert!(Pattern::new("a(?#comment)b").is_err());
        let re =
            Pattern::with_options("a(?#comment)b", CompileOptions::new().compat_comment(true))
                .unwrap();
        assert_eq!(re.groups(), 0);
        assert!(re.is_match("ab").unwrap());
    }

    #[test]
    fn flags() {
        let flags = Flags::IGNORECASE | Flags::MULTILINE;
        assert!(flags.contains(Flags::IGNORECASE));
        assert_eq!(flags.inert(), Flags::MULTILINE);
        assert_eq!(Flags::from_bits(2), Flags::IGNORECASE);

        let options = CompileOptions::new().flags(flags).case_insensitive(false);
        assert!(!options.is_case_insensitive());
        assert_eq!(options.flags, Flags::MULTILINE);
    }

    #[test]
    fn clones_share_one_handle() {
        let re = Pattern::new("x").unwrap();
        let copy = re.clone();
        drop(re);
        assert!(copy.is_match("x").unwrap());
        drop(copy);
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn pattern_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<Pattern>();
    }
}
