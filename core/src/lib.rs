//! linre - linear-time regular expressions with a `re`-style API
//!
//! A regex facade over a linear-time engine (RE2 semantics, no
//! backtracking, no catastrophic blow-up) that sits behind a C ABI.
//!
//! # Architecture
//!
//! ```text
//! Pattern / Match / FindIter / sub      host-facing facade
//!            │
//!       marshal guards                  release every engine buffer once
//!            │
//!      engine (extern "C")              compile, find, find-all, replace
//! ```
//!
//! - [`engine`]: The C ABI: `#[repr(C)]` result structures and paired
//!   allocate/release functions. Usable from any language with a C FFI.
//! - [`Pattern`]: One compiled engine handle; construction fails rather
//!   than producing an unusable pattern.
//! - [`Match`]: Group spans plus a borrow of the subject; never points into
//!   engine memory.
//! - [`FindIter`]: Lazy view over a batch of matches; the batch is released
//!   when the iterator is exhausted or dropped.
//! - [`Pattern::sub`] / [`Pattern::sub_with`]: Template substitution in the
//!   engine, callback substitution on the host.
//!
//! Subjects are `str` or `[u8]` (see [`Haystack`]). All offsets are byte
//! offsets.
//!
//! # Example
//!
//! ```
//! use linre::prelude::*;
//!
//! let re = Pattern::new(r"(\w+)@(\w+)\.com").unwrap();
//!
//! let m = re.search("mail bob@example.com today").unwrap().unwrap();
//! assert_eq!(m.group(1), Some("bob"));
//! assert_eq!(m.span(0), Some(Span::new(5, 20)));
//!
//! // `prefix_match` is anchored at the start only.
//! assert!(re.prefix_match("bob@example.com!").unwrap().is_some());
//! assert!(re.full_match("bob@example.com!").unwrap().is_none());
//!
//! assert_eq!(
//!     re.sub(r"\2:\1", "a@x.com, b@y.com").unwrap(),
//!     "x:a, y:b"
//! );
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

pub mod engine;

mod config;
mod haystack;
mod marshal;
mod matches;
mod pattern;
mod sub;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

pub use config::{max_memory_budget, set_max_memory_budget};
pub use engine::DEFAULT_MAX_MEMORY;
pub use haystack::Haystack;
pub use marshal::MatchResult;
pub use matches::{FindIter, Found, Match, Span};
pub use pattern::{CompileOptions, Flags, Pattern};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use linre::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CompileOptions, Error, FindIter, Flags, Found, Haystack, Match, MatchResult, Pattern,
        Span,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Longest subject, in bytes, the engine accepts.
///
/// Offsets cross the C ABI as `i32`.
#[allow(clippy::cast_sign_loss)]
pub const MAX_SUBJECT_LEN: usize = i32::MAX as usize;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from compiling, matching and substituting.
///
/// Using a group index the pattern does not have is a programming error and
/// panics instead (see [`Match::group`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The engine rejected the pattern.
    #[error("invalid pattern {pattern:?}: {message}")]
    Compile {
        /// The pattern as given.
        pattern: String,
        /// The engine's diagnostic.
        message: String,
    },
    /// The compiled pattern would exceed the memory budget.
    #[error(
        "pattern {pattern:?} exceeds the memory budget: {message} \
         (raise it with set_max_memory_budget)"
    )]
    BudgetExceeded {
        /// The pattern as given.
        pattern: String,
        /// The engine's diagnostic.
        message: String,
    },
    /// Bytes that must be UTF-8 are not, or a match boundary splits a
    /// character.
    #[error("invalid UTF-8 in {what} at byte {offset}")]
    Encoding {
        /// What was being decoded (`"pattern"`, `"group"`, ...).
        what: &'static str,
        /// Byte offset of the first invalid byte.
        offset: usize,
    },
    /// The subject is longer than [`MAX_SUBJECT_LEN`].
    #[error("subject is {len} bytes, but the maximum is {max}", max = MAX_SUBJECT_LEN)]
    SubjectTooLarge {
        /// Subject length in bytes.
        len: usize,
    },
    /// The rewrite template is not valid for this pattern.
    #[error(
        "invalid rewrite {rewrite:?}: only \\0 to \\9 for existing groups and \\\\ are allowed"
    )]
    InvalidRewrite {
        /// The rewrite, lossily decoded.
        rewrite: String,
    },
    /// The engine returned a structure that breaks its own contract.
    #[error("malformed engine result: {reason}")]
    MalformedResult {
        /// What was wrong with it.
        reason: &'static str,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Module-level functions
// ═══════════════════════════════════════════════════════════════════════════════
//
// Each call compiles the pattern afresh; nothing is cached between calls.

/// Compiles `pattern` with `flags`.
///
/// # Errors
///
/// See [`Pattern::from_bytes`].
pub fn compile(pattern: &str, flags: Flags) -> Result<Pattern, Error> {
    Pattern::with_options(pattern, CompileOptions::new().flags(flags))
}

/// Compiles `pattern` and runs [`Pattern::search`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::search`].
pub fn search<'s, H: Haystack + ?Sized>(
    pattern: &str,
    subject: &'s H,
    flags: Flags,
) -> Result<Option<Match<'s, H>>, Error> {
    compile(pattern, flags)?.search(subject)
}

/// Compiles `pattern` and runs [`Pattern::prefix_match`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::prefix_match`].
pub fn prefix_match<'s, H: Haystack + ?Sized>(
    pattern: &str,
    subject: &'s H,
    flags: Flags,
) -> Result<Option<Match<'s, H>>, Error> {
    compile(pattern, flags)?.prefix_match(subject)
}

/// Compiles `pattern` and runs [`Pattern::full_match`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::full_match`].
pub fn full_match<'s, H: Haystack + ?Sized>(
    pattern: &str,
    subject: &'s H,
    flags: Flags,
) -> Result<Option<Match<'s, H>>, Error> {
    compile(pattern, flags)?.full_match(subject)
}

/// Compiles `pattern` and runs [`Pattern::findall`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::findall`].
pub fn findall<'s, H: Haystack + ?Sized>(
    pattern: &str,
    subject: &'s H,
    flags: Flags,
) -> Result<Vec<Found<'s, H>>, Error> {
    compile(pattern, flags)?.findall(subject)
}

/// Compiles `pattern` and runs [`Pattern::finditer`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::finditer`].
pub fn finditer<'s, H: Haystack + ?Sized>(
    pattern: &str,
    subject: &'s H,
    flags: Flags,
) -> Result<FindIter<'s, H>, Error> {
    compile(pattern, flags)?.finditer(subject)
}

/// Compiles `pattern` and runs [`Pattern::sub`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::sub`].
pub fn sub<H: Haystack + ?Sized>(
    pattern: &str,
    rewrite: &H,
    subject: &H,
    flags: Flags,
) -> Result<H::Owned, Error> {
    compile(pattern, flags)?.sub(rewrite, subject)
}

/// Compiles `pattern` and runs [`Pattern::sub_with`].
///
/// # Errors
///
/// Compile errors, then errors of [`Pattern::sub_with`].
pub fn sub_with<'s, H, F, R>(
    pattern: &str,
    replace: F,
    subject: &'s H,
    flags: Flags,
) -> Result<H::Owned, Error>
where
    H: Haystack + ?Sized,
    F: FnMut(&Match<'s, H>) -> R,
    R: AsRef<H>,
{
    compile(pattern, flags)?.sub_with(replace, subject)
}
