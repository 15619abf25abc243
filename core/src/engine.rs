//! Engine adapter: the C ABI in front of the linear-time matcher.
//!
//! Everything the host side knows about the engine goes through the
//! `extern "C"` functions in this module. Results come back as plain
//! `#[repr(C)]` structures whose buffers are allocated here and must be
//! handed back to the matching `*_destroy` function exactly once.
//!
//! | Allocation | Produced by | Released by |
//! |------------|-------------|-------------|
//! | [`LINRE_REGEX`] | [`linre_new`] | [`linre_delete`] |
//! | [`LINRE_MATCH`] | [`linre_find_single`] | [`linre_match_destroy`] |
//! | [`LINRE_MULTI_MATCH`] | [`linre_find_all`] | [`linre_multi_match_destroy`] |
//! | [`LINRE_TEXT_MATCH`] | [`linre_find_single_copy`] | [`linre_text_match_destroy`] |
//! | [`LINRE_STRING`] | [`linre_global_replace`] | [`linre_string_destroy`] |
//!
//! The destroy functions take a pointer to the structure and null out its
//! buffers, so a second call on the same structure is a no-op.
//!
//! The engine is a `regex-automata` meta regex built from the pattern's
//! `regex-syntax` HIR (RE2 semantics, no backtracking). Offsets are `i32`
//! byte offsets; `(-1, -1)` marks a group that did not participate in the
//! match.

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{c_char, CString};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use regex_automata::meta;
use regex_automata::{Anchored, Input, PatternID};
use regex_syntax::hir::{Hir, Look};
use regex_syntax::ParserBuilder;

/// Default memory budget per compiled pattern (128 MiB).
///
/// The engine's own default is far smaller; host text can be large.
pub const DEFAULT_MAX_MEMORY: usize = 128 * 1024 * 1024;

static MAX_MEMORY: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_MEMORY);

/// Outcome of compiling a pattern.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LINRE_RESULT {
    SUCCESS,
    SYNTAX_ERROR,
    ENCODING_ERROR,
    MEMORY_BUDGET_EXCEEDED,
}

/// Where a match is allowed to start and end.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LINRE_ANCHOR {
    /// The match may start anywhere at or after the start position.
    UNANCHORED,
    /// The match must start at the start position.
    ANCHOR_START,
    /// The match must start at the start position and end at the end of
    /// the data.
    ANCHOR_BOTH,
}

/// A half-open byte range. `(-1, -1)` means the group did not participate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LINRE_RANGE {
    pub start: i32,
    pub end: i32,
}

impl LINRE_RANGE {
    /// Range reported for a group that did not participate.
    pub const UNSET: Self = Self { start: -1, end: -1 };
}

/// Result of a single search. `ranges` holds `num_groups` entries, entry 0
/// being the whole match, and is null when `has_match` is false.
#[repr(C)]
#[derive(Debug)]
pub struct LINRE_MATCH {
    pub has_match: bool,
    pub num_groups: i32,
    pub ranges: *mut LINRE_RANGE,
}

/// All non-overlapping matches, left to right. The `matches` array is
/// allocated even when `num_matches` is zero.
#[repr(C)]
#[derive(Debug)]
pub struct LINRE_MULTI_MATCH {
    pub num_matches: i32,
    pub num_groups: i32,
    pub matches: *mut LINRE_MATCH,
}

/// A byte string copied out of the subject. `data` is null for a group
/// that did not participate.
#[repr(C)]
#[derive(Debug)]
pub struct LINRE_BYTES {
    pub data: *mut u8,
    pub len: usize,
}

/// Result of a single search where every group is copied into its own
/// buffer instead of being reported as a range.
#[repr(C)]
#[derive(Debug)]
pub struct LINRE_TEXT_MATCH {
    pub has_match: bool,
    pub num_groups: i32,
    pub groups: *mut LINRE_BYTES,
}

/// A compiled pattern, or the reason it failed to compile.
///
/// Failed compilations still produce a handle (carrying only the error),
/// and that handle must be released with [`linre_delete`] like any other.
pub struct LINRE_REGEX {
    compiled: Result<Compiled, Failure>,
}

/// An engine-owned byte string produced by [`linre_global_replace`].
pub struct LINRE_STRING(Vec<u8>);

// Pattern 0 is the pattern as given; pattern 1 is the same HIR followed by
// `\z`, searched only for ANCHOR_BOTH. An unanchored search reports pattern 0:
// every match of pattern 1 is also a match of pattern 0 at the same start.
const AS_GIVEN: PatternID = PatternID::ZERO;
const TO_END: PatternID = PatternID::new_unchecked(1);

struct Compiled {
    regex: meta::Regex,
    num_groups: usize,
}

struct Failure {
    code: LINRE_RESULT,
    message: CString,
}

impl Failure {
    fn new(code: LINRE_RESULT, message: &str) -> Self {
        Self {
            code,
            message: CString::new(message.replace('\0', "\\x00")).unwrap_or_default(),
        }
    }
}

impl From<regex_syntax::Error> for Failure {
    fn from(err: regex_syntax::Error) -> Self {
        Self::new(LINRE_RESULT::SYNTAX_ERROR, &err.to_string())
    }
}

impl From<meta::BuildError> for Failure {
    fn from(err: meta::BuildError) -> Self {
        let code = match err.size_limit() {
            Some(_) => LINRE_RESULT::MEMORY_BUDGET_EXCEEDED,
            None => LINRE_RESULT::SYNTAX_ERROR,
        };
        Self::new(code, &err.to_string())
    }
}

/// One hit of the engine: the whole-match bounds plus every group.
struct Hit {
    start: usize,
    end: usize,
    groups: Vec<Option<(usize, usize)>>,
}

impl Hit {
    fn ranges(&self) -> Vec<LINRE_RANGE> {
        self.groups
            .iter()
            .map(|group| match group {
                Some((start, end)) => LINRE_RANGE {
                    start: offset_to_i32(*start),
                    end: offset_to_i32(*end),
                },
                None => LINRE_RANGE::UNSET,
            })
            .collect()
    }
}

impl Compiled {
    fn new(source: &str, case_insensitive: bool) -> Result<Self, Failure> {
        let limit = MAX_MEMORY.load(Ordering::Relaxed);
        let hir = ParserBuilder::new()
            .case_insensitive(case_insensitive)
            .utf8(false)
            .build()
            .parse(source)?;
        let to_end = Hir::concat(vec![hir.clone(), Hir::look(Look::End)]);

        let config = meta::Config::new()
            .nfa_size_limit(Some(limit))
            .onepass_size_limit(Some(limit))
            .dfa_size_limit(Some(limit))
            .hybrid_cache_capacity(limit)
            .utf8_empty(false);
        let regex = meta::Builder::new()
            .configure(config)
            .build_many_from_hir(&[hir, to_end])?;

        Ok(Self {
            num_groups: regex.group_info().group_len(AS_GIVEN).saturating_sub(1),
            regex,
        })
    }

    fn find(&self, data: &[u8], start: usize, anchor: LINRE_ANCHOR) -> Option<Hit> {
        let anchored = match anchor {
            LINRE_ANCHOR::UNANCHORED => Anchored::No,
            LINRE_ANCHOR::ANCHOR_START => Anchored::Pattern(AS_GIVEN),
            LINRE_ANCHOR::ANCHOR_BOTH => Anchored::Pattern(TO_END),
        };
        let input = Input::new(data).range(start..).anchored(anchored);
        let mut caps = self.regex.create_captures();
        self.regex.search_captures(&input, &mut caps);
        let found = caps.get_match()?;

        Some(Hit {
            start: found.start(),
            end: found.end(),
            groups: (0..caps.group_len())
                .map(|i| caps.get_group(i).map(|span| (span.start, span.end)))
                .collect(),
        })
    }

    /// Rewrite strings may only contain `\\` and `\0`..`\9` escapes, and
    /// only reference groups the pattern has.
    fn check_rewrite(&self, rewrite: &[u8]) -> bool {
        let mut bytes = rewrite.iter().copied();
        while let Some(b) = bytes.next() {
            if b != b'\\' {
                continue;
            }
            match bytes.next() {
                Some(b'\\') => {}
                Some(d @ b'0'..=b'9') if usize::from(d - b'0') <= self.num_groups => {}
                _ => return false,
            }
        }
        true
    }
}

fn expand_rewrite(out: &mut Vec<u8>, rewrite: &[u8], data: &[u8], hit: &Hit) {
    let mut bytes = rewrite.iter().copied();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(d @ b'0'..=b'9') => {
                if let Some(Some((start, end))) = hit.groups.get(usize::from(d - b'0')) {
                    out.extend_from_slice(&data[*start..*end]);
                }
            }
            // Rejected by `check_rewrite`.
            _ => {}
        }
    }
}

/// Number of bytes to step over after an empty match at `at`: a whole
/// UTF-8 sequence when a valid one starts there, otherwise one byte.
fn empty_match_step(data: &[u8], at: usize) -> usize {
    let Some(tail) = data.get(at..) else {
        return 1;
    };
    tail[..tail.len().min(4)]
        .utf8_chunks()
        .next()
        .and_then(|chunk| chunk.valid().chars().next())
        .map_or(1, char::len_utf8)
}

fn offset_to_i32(offset: usize) -> i32 {
    i32::try_from(offset).unwrap_or(-1)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Buffer bookkeeping
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
thread_local! {
    static LIVE_BUFFERS: std::cell::Cell<isize> = const { std::cell::Cell::new(0) };
}

/// Number of engine allocations made on this thread that were not released
/// yet.
#[cfg(test)]
pub(crate) fn live_buffers() -> isize {
    LIVE_BUFFERS.with(std::cell::Cell::get)
}

#[cfg(test)]
fn track(delta: isize) {
    LIVE_BUFFERS.with(|live| live.set(live.get() + delta));
}

#[cfg(not(test))]
fn track(_delta: isize) {}

fn into_raw_slice<T>(items: Vec<T>) -> *mut T {
    track(1);
    Box::into_raw(items.into_boxed_slice()).cast()
}

unsafe fn drop_raw_slice<T>(items: *mut T, len: usize) {
    if items.is_null() {
        return;
    }
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(items, len)));
    track(-1);
}

unsafe fn bytes_from_raw<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len)
    }
}

unsafe fn compiled<'a>(re: *const LINRE_REGEX) -> Option<&'a Compiled> {
    re.as_ref()?.compiled.as_ref().ok()
}

/// Returns the data as a slice, or `None` if it is too long for `i32`
/// offsets.
unsafe fn subject<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    i32::try_from(len).ok()?;
    Some(bytes_from_raw(data, len))
}

fn start_position(data: &[u8], startpos: i32) -> Option<usize> {
    usize::try_from(startpos).ok().filter(|pos| *pos <= data.len())
}

impl LINRE_MATCH {
    const fn none() -> Self {
        Self {
            has_match: false,
            num_groups: 0,
            ranges: ptr::null_mut(),
        }
    }
}

impl LINRE_TEXT_MATCH {
    const fn none() -> Self {
        Self {
            has_match: false,
            num_groups: 0,
            groups: ptr::null_mut(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles `len` bytes of UTF-8 at `pattern` into a [`LINRE_REGEX`].
///
/// Never returns null. Check [`linre_ok`] before matching; failed handles
/// carry an error message and code and must still be released with
/// [`linre_delete`].
///
/// The handle uses the memory budget in effect at the time of the call.
#[no_mangle]
pub unsafe extern "C" fn linre_new(
    pattern: *const u8,
    len: usize,
    case_insensitive: bool,
) -> *mut LINRE_REGEX {
    let compiled = match std::str::from_utf8(bytes_from_raw(pattern, len)) {
        Ok(source) => Compiled::new(source, case_insensitive),
        Err(err) => Err(Failure::new(
            LINRE_RESULT::ENCODING_ERROR,
            &format!("pattern is not valid UTF-8: {err}"),
        )),
    };
    track(1);
    Box::into_raw(Box::new(LINRE_REGEX { compiled }))
}

/// Returns true if the pattern compiled.
#[no_mangle]
pub unsafe extern "C" fn linre_ok(re: *const LINRE_REGEX) -> bool {
    compiled(re).is_some()
}

/// Returns the compilation outcome of a handle.
///
/// A null handle is reported as [`LINRE_RESULT::SYNTAX_ERROR`].
#[no_mangle]
pub unsafe extern "C" fn linre_error_code(re: *const LINRE_REGEX) -> LINRE_RESULT {
    match re.as_ref().map(|re| &re.compiled) {
        Some(Ok(_)) => LINRE_RESULT::SUCCESS,
        Some(Err(failure)) => failure.code,
        None => LINRE_RESULT::SYNTAX_ERROR,
    }
}

/// Returns the engine's diagnostic for a failed compilation, or an empty
/// string for a handle that compiled.
///
/// The string is null-terminated and lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn linre_error_msg(re: *const LINRE_REGEX) -> *const c_char {
    match re.as_ref().map(|re| &re.compiled) {
        Some(Err(failure)) => failure.message.as_ptr(),
        _ => b"\0".as_ptr().cast(),
    }
}

/// Returns the number of capturing groups, not counting the whole match,
/// or -1 for a handle that failed to compile.
#[no_mangle]
pub unsafe extern "C" fn linre_num_groups(re: *const LINRE_REGEX) -> i32 {
    compiled(re).map_or(-1, |c| i32::try_from(c.num_groups).unwrap_or(-1))
}

/// Destroys a [`LINRE_REGEX`].
#[no_mangle]
pub unsafe extern "C" fn linre_delete(re: *mut LINRE_REGEX) {
    if re.is_null() {
        return;
    }
    drop(Box::from_raw(re));
    track(-1);
}

/// Sets the memory budget, in bytes, for patterns compiled after this call.
///
/// Already compiled patterns keep the budget they were built with.
/// Returns false, leaving the budget unchanged, if `bytes` is negative.
#[no_mangle]
pub extern "C" fn linre_set_max_memory(bytes: i64) -> bool {
    match usize::try_from(bytes) {
        Ok(bytes) => {
            MAX_MEMORY.store(bytes, Ordering::Relaxed);
            true
        }
        Err(_) => false,
    }
}

/// Returns the memory budget applied to newly compiled patterns.
#[no_mangle]
pub extern "C" fn linre_max_memory() -> i64 {
    i64::try_from(MAX_MEMORY.load(Ordering::Relaxed)).unwrap_or(i64::MAX)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds the first match at or after `startpos`.
///
/// The result must be released with [`linre_match_destroy`]. A failed
/// handle, a `startpos` outside the data, or data longer than `i32::MAX`
/// bytes all produce a result without a match.
#[no_mangle]
pub unsafe extern "C" fn linre_find_single(
    re: *const LINRE_REGEX,
    data: *const u8,
    len: usize,
    anchor: LINRE_ANCHOR,
    startpos: i32,
) -> LINRE_MATCH {
    let (Some(compiled), Some(data)) = (compiled(re), subject(data, len)) else {
        return LINRE_MATCH::none();
    };
    let Some(start) = start_position(data, startpos) else {
        return LINRE_MATCH::none();
    };

    match compiled.find(data, start, anchor) {
        Some(hit) => {
            let ranges = hit.ranges();
            LINRE_MATCH {
                has_match: true,
                num_groups: offset_to_i32(ranges.len()),
                ranges: into_raw_slice(ranges),
            }
        }
        None => LINRE_MATCH::none(),
    }
}

/// Finds all non-overlapping matches at or after `startpos`, left to right.
///
/// After a match, scanning resumes at its end; after an empty match it
/// steps forward by at least one byte (a whole UTF-8 sequence when one
/// starts there). With [`LINRE_ANCHOR::ANCHOR_START`] every match must
/// start where the previous one ended; with [`LINRE_ANCHOR::ANCHOR_BOTH`]
/// there is at most one match.
///
/// The result must be released with [`linre_multi_match_destroy`].
#[no_mangle]
pub unsafe extern "C" fn linre_find_all(
    re: *const LINRE_REGEX,
    data: *const u8,
    len: usize,
    anchor: LINRE_ANCHOR,
    startpos: i32,
) -> LINRE_MULTI_MATCH {
    let mut matches = Vec::new();
    let mut num_groups = 0;

    if let (Some(compiled), Some(data)) = (compiled(re), subject(data, len)) {
        num_groups = compiled.num_groups + 1;
        let mut pos = start_position(data, startpos);

        while let Some(start) = pos.filter(|p| *p <= data.len()) {
            let Some(hit) = compiled.find(data, start, anchor) else {
                break;
            };
            pos = Some(if hit.start == hit.end {
                hit.end + empty_match_step(data, hit.end)
            } else {
                hit.end
            });

            let ranges = hit.ranges();
            matches.push(LINRE_MATCH {
                has_match: true,
                num_groups: offset_to_i32(ranges.len()),
                ranges: into_raw_slice(ranges),
            });

            if anchor == LINRE_ANCHOR::ANCHOR_BOTH {
                break;
            }
        }
    }

    LINRE_MULTI_MATCH {
        num_matches: offset_to_i32(matches.len()),
        num_groups: offset_to_i32(num_groups),
        matches: into_raw_slice(matches),
    }
}

/// Like [`linre_find_single`], but copies every group into a freshly
/// allocated buffer.
///
/// The result must be released with [`linre_text_match_destroy`].
#[no_mangle]
pub unsafe extern "C" fn linre_find_single_copy(
    re: *const LINRE_REGEX,
    data: *const u8,
    len: usize,
    anchor: LINRE_ANCHOR,
    startpos: i32,
) -> LINRE_TEXT_MATCH {
    let (Some(compiled), Some(data)) = (compiled(re), subject(data, len)) else {
        return LINRE_TEXT_MATCH::none();
    };
    let Some(start) = start_position(data, startpos) else {
        return LINRE_TEXT_MATCH::none();
    };
    let Some(hit) = compiled.find(data, start, anchor) else {
        return LINRE_TEXT_MATCH::none();
    };

    let groups: Vec<LINRE_BYTES> = hit
        .groups
        .iter()
        .map(|group| match group {
            Some((start, end)) => LINRE_BYTES {
                data: into_raw_slice(data[*start..*end].to_vec()),
                len: end - start,
            },
            None => LINRE_BYTES {
                data: ptr::null_mut(),
                len: 0,
            },
        })
        .collect();

    LINRE_TEXT_MATCH {
        has_match: true,
        num_groups: offset_to_i32(groups.len()),
        groups: into_raw_slice(groups),
    }
}

/// Releases the buffers of a [`LINRE_MATCH`] and resets it to "no match".
#[no_mangle]
pub unsafe extern "C" fn linre_match_destroy(result: *mut LINRE_MATCH) {
    let Some(result) = result.as_mut() else {
        return;
    };
    // A negative count cannot describe the allocation; leak it.
    let Ok(len) = usize::try_from(result.num_groups) else {
        return;
    };
    drop_raw_slice(result.ranges, len);
    *result = LINRE_MATCH::none();
}

/// Releases the buffers of a [`LINRE_MULTI_MATCH`], including every match
/// it holds, and resets it to an empty result.
#[no_mangle]
pub unsafe extern "C" fn linre_multi_match_destroy(result: *mut LINRE_MULTI_MATCH) {
    let Some(result) = result.as_mut() else {
        return;
    };
    // A negative count cannot describe the allocation; leak it.
    let Ok(len) = usize::try_from(result.num_matches) else {
        return;
    };
    if !result.matches.is_null() {
        for m in slice::from_raw_parts_mut(result.matches, len) {
            linre_match_destroy(m);
        }
    }
    drop_raw_slice(result.matches, len);
    result.num_matches = 0;
    result.num_groups = 0;
    result.matches = ptr::null_mut();
}

/// Releases the buffers of a [`LINRE_TEXT_MATCH`] and resets it to
/// "no match".
#[no_mangle]
pub unsafe extern "C" fn linre_text_match_destroy(result: *mut LINRE_TEXT_MATCH) {
    let Some(result) = result.as_mut() else {
        return;
    };
    // A negative count cannot describe the allocation; leak it.
    let Ok(len) = usize::try_from(result.num_groups) else {
        return;
    };
    if !result.groups.is_null() {
        for group in slice::from_raw_parts_mut(result.groups, len) {
            drop_raw_slice(group.data, group.len);
        }
    }
    drop_raw_slice(result.groups, len);
    *result = LINRE_TEXT_MATCH::none();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Replacement
// ═══════════════════════════════════════════════════════════════════════════════

/// Replaces every non-overlapping match in the data with `rewrite`.
///
/// `rewrite` may reference groups as `\0`..`\9` and write a literal
/// backslash as `\\`. An empty match right after the previous match is not
/// replaced. Returns null if the handle failed to compile, the data is too
/// long, or the rewrite is invalid for this pattern; otherwise the result
/// must be released with [`linre_string_destroy`].
#[no_mangle]
pub unsafe extern "C" fn linre_global_replace(
    re: *const LINRE_REGEX,
    data: *const u8,
    len: usize,
    rewrite: *const u8,
    rewrite_len: usize,
) -> *mut LINRE_STRING {
    let (Some(compiled), Some(data)) = (compiled(re), subject(data, len)) else {
        return ptr::null_mut();
    };
    let rewrite = bytes_from_raw(rewrite, rewrite_len);
    if !compiled.check_rewrite(rewrite) {
        return ptr::null_mut();
    }

    let mut out = Vec::with_capacity(data.len());
    let mut copied = 0;
    let mut last_end = None;
    let mut pos = 0;

    while pos <= data.len() {
        let Some(hit) = compiled.find(data, pos, LINRE_ANCHOR::UNANCHORED) else {
            break;
        };
        if hit.start == hit.end && last_end == Some(hit.end) {
            pos = hit.end + empty_match_step(data, hit.end);
            continue;
        }

        out.extend_from_slice(&data[copied..hit.start]);
        expand_rewrite(&mut out, rewrite, data, &hit);
        copied = hit.end;
        last_end = Some(hit.end);
        pos = if hit.start == hit.end {
            hit.end + empty_match_step(data, hit.end)
        } else {
            hit.end
        };
    }
    out.extend_from_slice(&data[copied..]);

    track(1);
    Box::into_raw(Box::new(LINRE_STRING(out)))
}

/// Returns a pointer to the bytes of a [`LINRE_STRING`] and their length.
///
/// The bytes are *NOT* null-terminated and stay valid until the string is
/// destroyed. Returns false if `string` is null.
#[no_mangle]
pub unsafe extern "C" fn linre_string_data(
    string: *const LINRE_STRING,
    data: &mut *const u8,
    len: &mut usize,
) -> bool {
    if let Some(string) = string.as_ref() {
        *data = string.0.as_ptr();
        *len = string.0.len();
        true
    } else {
        false
    }
}

/// Destroys a [`LINRE_STRING`].
#[no_mangle]
pub unsafe extern "C" fn linre_string_destroy(string: *mut LINRE_STRING) {
    if string.is_null() {
        return;
    }
    drop(Box::from_raw(string));
    track(-1);
}
