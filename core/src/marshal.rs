//! Foreign result buffers → host-owned values.
//!
//! Every structure the engine hands back is wrapped in a guard the moment
//! it crosses the boundary. The guard releases the buffer in `Drop`, so the
//! release happens exactly once on every path: success, "no match",
//! conversion errors and iterators dropped half-way.
//!
//! Conversion never keeps a pointer into engine memory. Range results are
//! checked against the host's own copy of the subject and kept as
//! [`Span`]s; copied results are decoded into owned values.

use std::ptr::NonNull;
use std::slice;

use log::trace;

use crate::engine::{
    self, LINRE_BYTES, LINRE_MATCH, LINRE_MULTI_MATCH, LINRE_RANGE, LINRE_STRING,
    LINRE_TEXT_MATCH,
};
use crate::{Error, Haystack, Span};

/// The groups of one match: index 0 is the whole match, indices `1..` the
/// capture groups in declaration order. `None` marks a group that did not
/// participate.
///
/// `P` is [`Span`] for range results and an owned value for copied results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult<P> {
    groups: Vec<Option<P>>,
}

impl<P> MatchResult<P> {
    pub(crate) fn new(groups: Vec<Option<P>>) -> Self {
        Self { groups }
    }

    /// Number of entries, including the whole match.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false: a result holds at least the whole-match entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The entry for group `index`, or `None` if it did not participate or
    /// does not exist.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&P> {
        self.groups.get(index).and_then(Option::as_ref)
    }

    /// All entries, whole match first.
    #[must_use]
    pub fn groups(&self) -> &[Option<P>] {
        &self.groups
    }

    /// Consumes the result, returning its entries.
    #[must_use]
    pub fn into_groups(self) -> Vec<Option<P>> {
        self.groups
    }
}

fn malformed(reason: &'static str) -> Error {
    Error::MalformedResult { reason }
}

fn count(value: i32, reason: &'static str) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| malformed(reason))
}

fn span_of<H: Haystack + ?Sized>(range: LINRE_RANGE, subject: &H) -> Result<Option<Span>, Error> {
    if range == LINRE_RANGE::UNSET {
        return Ok(None);
    }
    let (Ok(start), Ok(end)) = (usize::try_from(range.start), usize::try_from(range.end)) else {
        return Err(malformed("negative offset"));
    };
    if start > end || end > subject.as_bytes().len() {
        return Err(malformed("range outside the subject"));
    }

    let span = Span::new(start, end);
    match subject.slice(span) {
        Some(_) => Ok(Some(span)),
        None => Err(Error::Encoding {
            what: "match boundary",
            offset: start,
        }),
    }
}

/// Converts one range-mode match. A match that reports no entries at all
/// (whole match suppressed, no groups) becomes a single unset entry.
unsafe fn spans_of<H: Haystack + ?Sized>(
    m: &LINRE_MATCH,
    subject: &H,
) -> Result<Option<MatchResult<Span>>, Error> {
    if !m.has_match {
        return Ok(None);
    }
    let n = count(m.num_groups, "negative group count")?;
    if n == 0 || m.ranges.is_null() {
        return Ok(Some(MatchResult::new(vec![None])));
    }

    slice::from_raw_parts(m.ranges, n)
        .iter()
        .map(|range| span_of(*range, subject))
        .collect::<Result<Vec<_>, _>>()
        .map(|spans| Some(MatchResult::new(spans)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guards
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns a [`LINRE_MATCH`] until dropped.
pub(crate) struct MatchGuard(LINRE_MATCH);

impl MatchGuard {
    pub(crate) fn new(raw: LINRE_MATCH) -> Self {
        Self(raw)
    }

    pub(crate) fn spans<H: Haystack + ?Sized>(
        &self,
        subject: &H,
    ) -> Result<Option<MatchResult<Span>>, Error> {
        // SAFETY: `ranges` was allocated by the engine with `num_groups`
        // entries and is not released before `self` is dropped.
        unsafe { spans_of(&self.0, subject) }
    }
}

impl Drop for MatchGuard {
    fn drop(&mut self) {
        // SAFETY: the guard is the only owner of the result.
        unsafe { engine::linre_match_destroy(&mut self.0) };
        trace!("released single-match result");
    }
}

/// Owns a [`LINRE_MULTI_MATCH`] until dropped.
///
/// Matches are converted one at a time through [`spans_at`](Self::spans_at),
/// so an iterator holding the guard marshals lazily and still releases the
/// whole batch when it goes away.
pub(crate) struct MultiMatchGuard {
    raw: LINRE_MULTI_MATCH,
    len: usize,
}

impl MultiMatchGuard {
    /// Takes ownership of `raw`.
    ///
    /// A negative match count says nothing about how the array was
    /// allocated, so such a batch is leaked rather than released.
    pub(crate) fn new(raw: LINRE_MULTI_MATCH) -> Result<Self, Error> {
        let len = count(raw.num_matches, "negative match count")?;
        let guard = Self { raw, len };
        if guard.len > 0 && guard.raw.matches.is_null() {
            return Err(malformed("missing match array"));
        }
        Ok(guard)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Converts match `index`, or returns `Ok(None)` past the end.
    pub(crate) fn spans_at<H: Haystack + ?Sized>(
        &self,
        index: usize,
        subject: &H,
    ) -> Result<Option<MatchResult<Span>>, Error> {
        if index >= self.len {
            return Ok(None);
        }
        // SAFETY: `matches` holds `len` entries (checked in `new`) that stay
        // allocated until `self` is dropped.
        let m = unsafe { &*self.raw.matches.add(index) };
        match unsafe { spans_of(m, subject) }? {
            Some(result) => Ok(Some(result)),
            None => Err(malformed("batch entry without a match")),
        }
    }
}

impl Drop for MultiMatchGuard {
    fn drop(&mut self) {
        // SAFETY: the guard is the only owner of the batch.
        unsafe { engine::linre_multi_match_destroy(&mut self.raw) };
        trace!("released multi-match result ({} matches)", self.len);
    }
}

/// Owns a [`LINRE_TEXT_MATCH`] until dropped.
pub(crate) struct TextMatchGuard(LINRE_TEXT_MATCH);

impl TextMatchGuard {
    pub(crate) fn new(raw: LINRE_TEXT_MATCH) -> Self {
        Self(raw)
    }

    /// Decodes every copied group into an owned value.
    pub(crate) fn decode<H: Haystack + ?Sized>(
        &self,
    ) -> Result<Option<MatchResult<H::Owned>>, Error> {
        if !self.0.has_match {
            return Ok(None);
        }
        let n = count(self.0.num_groups, "negative group count")?;
        if n == 0 || self.0.groups.is_null() {
            return Ok(Some(MatchResult::new(vec![None])));
        }

        // SAFETY: `groups` holds `num_groups` entries, each either null or
        // pointing at `len` bytes, all owned by this guard.
        let groups: &[LINRE_BYTES] = unsafe { slice::from_raw_parts(self.0.groups, n) };
        groups
            .iter()
            .map(|group| {
                if group.data.is_null() {
                    return Ok(None);
                }
                let bytes = unsafe { slice::from_raw_parts(group.data, group.len) };
                H::decode(bytes.to_vec(), "group").map(Some)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|groups| Some(MatchResult::new(groups)))
    }
}

impl Drop for TextMatchGuard {
    fn drop(&mut self) {
        // SAFETY: the guard is the only owner of the result.
        unsafe { engine::linre_text_match_destroy(&mut self.0) };
        trace!("released copied single-match result");
    }
}

/// Owns a [`LINRE_STRING`] until dropped.
pub(crate) struct StringGuard(NonNull<LINRE_STRING>);

impl StringGuard {
    /// Wraps a string returned by the engine; `None` if it is null.
    pub(crate) fn new(raw: *mut LINRE_STRING) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub(crate) fn decode<H: Haystack + ?Sized>(&self, what: &'static str) -> Result<H::Owned, Error> {
        let mut data = std::ptr::null();
        let mut len = 0;
        // SAFETY: the string is alive until `self` is dropped; the bytes are
        // copied before that.
        let bytes = unsafe {
            if !engine::linre_string_data(self.0.as_ptr(), &mut data, &mut len) {
                return Err(malformed("unreadable string"));
            }
            if data.is_null() || len == 0 {
                &[][..]
            } else {
                slice::from_raw_parts(data, len)
            }
        };
        H::decode(bytes.to_vec(), what)
    }
}

impl Drop for StringGuard {
    fn drop(&mut self) {
        // SAFETY: the guard is the only owner of the string.
        unsafe { engine::linre_string_destroy(self.0.as_ptr()) };
        trace!("released replacement string");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{live_buffers, LINRE_ANCHOR};

    fn with_regex<T>(pattern: &str, f: impl FnOnce(*const engine::LINRE_REGEX) -> T) -> T {
        unsafe {
            let re = engine::linre_new(pattern.as_ptr(), pattern.len(), false);
            let out = f(re);
            engine::linre_delete(re);
            out
        }
    }

    fn single(re: *const engine::LINRE_REGEX, subject: &str) -> MatchGuard {
        MatchGuard::new(unsafe {
            engine::linre_find_single(
                re,
                subject.as_ptr(),
                subject.len(),
                LINRE_ANCHOR::UNANCHORED,
                0,
            )
        })
    }

    #[test]
    fn single_match_becomes_spans() {
        let result = with_regex("a(b+)(x)?", |re| single(re, "zabbc").spans("zabbc").unwrap());
        let result = result.unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.get(0), Some(&Span::new(1, 4)));
        assert_eq!(result.get(1), Some(&Span::new(2, 4)));
        assert_eq!(result.get(2), None);
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn no_match_is_none_and_released() {
        let result = with_regex("q", |re| single(re, "abc").spans("abc").unwrap());
        assert!(result.is_none());
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn suppressed_whole_match_is_normalized() {
        let m = LINRE_MATCH {
            has_match: true,
            num_groups: 0,
            ranges: std::ptr::null_mut(),
        };
        let result = MatchGuard::new(m).spans("abc").unwrap().unwrap();
        assert_eq!(result.groups(), &[None]);
    }

    #[test]
    fn out_of_bounds_range_is_malformed() {
        let result = with_regex("abc", |re| {
            let guard = single(re, "xxabc");
            // Checked against a shorter subject than the engine saw.
            guard.spans("xxa").map(|_| ())
        });
        assert!(matches!(result, Err(Error::MalformedResult { .. })));
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn split_character_is_an_encoding_error() {
        let data = "é".as_bytes();
        let result = with_regex(r"(?-u:\xA9)", |re| {
            let guard = MatchGuard::new(unsafe {
                engine::linre_find_single(re, data.as_ptr(), data.len(), LINRE_ANCHOR::UNANCHORED, 0)
            });
            // Fine as bytes, not as text.
            assert!(guard.spans(data).unwrap().is_some());
            guard.spans("é").map(|_| ())
        });
        assert!(matches!(result, Err(Error::Encoding { offset: 1, .. })));
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn multi_match_is_converted_lazily() {
        with_regex("b+", |re| {
            let subject = "abbcbd";
            let guard = MultiMatchGuard::new(unsafe {
                engine::linre_find_all(
                    re,
                    subject.as_ptr(),
                    subject.len(),
                    LINRE_ANCHOR::UNANCHORED,
                    0,
                )
            })
            .unwrap();
            assert_eq!(guard.len(), 2);
            let second = guard.spans_at(1, subject).unwrap().unwrap();
            assert_eq!(second.get(0), Some(&Span::new(4, 5)));
            assert!(guard.spans_at(2, subject).unwrap().is_none());
        });
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn negative_match_count_leaks_the_batch() {
        with_regex("a", |re| {
            let raw = unsafe {
                engine::linre_find_all(re, b"aa".as_ptr(), 2, LINRE_ANCHOR::UNANCHORED, 0)
            };
            let (num_matches, num_groups, matches) = (raw.num_matches, raw.num_groups, raw.matches);
            let before = live_buffers();

            let bad = LINRE_MULTI_MATCH {
                num_matches: -1,
                num_groups,
                matches,
            };
            assert!(matches!(
                MultiMatchGuard::new(bad),
                Err(Error::MalformedResult { .. })
            ));
            assert_eq!(live_buffers(), before);

            // The batch is still intact and can be released properly.
            let good = LINRE_MULTI_MATCH {
                num_matches,
                num_groups,
                matches,
            };
            assert_eq!(MultiMatchGuard::new(good).unwrap().len(), 2);
        });
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn copied_groups_are_decoded() {
        let result = with_regex("a(b+)(x)?", |re| {
            let guard = TextMatchGuard::new(unsafe {
                engine::linre_find_single_copy(re, b"abbc".as_ptr(), 4, LINRE_ANCHOR::UNANCHORED, 0)
            });
            guard.decode::<str>().unwrap()
        });
        let result = result.unwrap();
        assert_eq!(
            result.into_groups(),
            vec![Some("abb".to_string()), Some("bb".to_string()), None]
        );
        assert_eq!(live_buffers(), 0);
    }

    #[test]
    fn null_string_has_no_guard() {
        assert!(StringGuard::new(std::ptr::null_mut()).is_none());
    }
}
