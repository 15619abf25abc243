//! Match facade: `search`, `prefix_match`, `full_match`, `findall` and
//! `finditer` on a [`Pattern`], and the [`Match`] objects they produce.
//!
//! All offsets are byte offsets into the subject. Group 0 is the whole
//! match; groups `1..` follow the order of their opening parenthesis.

use std::fmt;
use std::iter::FusedIterator;
use std::ops::Range;

use crate::engine::{self, LINRE_ANCHOR};
use crate::marshal::{MatchGuard, MatchResult, MultiMatchGuard, TextMatchGuard};
use crate::{Error, Haystack, Pattern, MAX_SUBJECT_LEN};

/// A half-open byte range `start..end` into a subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn range(self) -> Range<usize> {
        self.start..self.end
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.range()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Match
// ═══════════════════════════════════════════════════════════════════════════════

/// One match of a [`Pattern`] against a subject.
///
/// Holds the subject by reference and the group spans by value; nothing
/// points into engine memory.
pub struct Match<'s, H: Haystack + ?Sized = str> {
    pattern: Pattern,
    subject: &'s H,
    spans: Vec<Option<Span>>,
}

impl<'s, H: Haystack + ?Sized> Match<'s, H> {
    pub(crate) fn new(pattern: Pattern, subject: &'s H, result: MatchResult<Span>) -> Self {
        Self {
            pattern,
            subject,
            spans: result.into_groups(),
        }
    }

    fn entry(&self, index: usize) -> Option<Span> {
        assert!(
            index < self.spans.len(),
            "no such group: {index} (pattern {:?} has {} groups)",
            self.pattern.as_str(),
            self.spans.len() - 1,
        );
        self.spans[index]
    }

    /// The text of group `index`, or `None` if the group did not
    /// participate in the match.
    ///
    /// # Panics
    ///
    /// Panics if the pattern has no group `index`. Use [`Match::get`] for a
    /// non-panicking lookup.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&'s H> {
        self.entry(index).and_then(|span| self.subject.slice(span))
    }

    /// Like [`Match::group`], but returns `None` for a group that does not
    /// exist.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'s H> {
        self.spans
            .get(index)
            .copied()
            .flatten()
            .and_then(|span| self.subject.slice(span))
    }

    /// The text of every capture group, whole match excluded.
    #[must_use]
    pub fn groups(&self) -> Vec<Option<&'s H>> {
        (1..self.spans.len()).map(|i| self.group(i)).collect()
    }

    /// # Panics
    ///
    /// Panics if the pattern has no group `index`.
    #[must_use]
    pub fn span(&self, index: usize) -> Option<Span> {
        self.entry(index)
    }

    /// # Panics
    ///
    /// Panics if the pattern has no group `index`.
    #[must_use]
    pub fn start(&self, index: usize) -> Option<usize> {
        self.entry(index).map(|span| span.start)
    }

    /// # Panics
    ///
    /// Panics if the pattern has no group `index`.
    #[must_use]
    pub fn end(&self, index: usize) -> Option<usize> {
        self.entry(index).map(|span| span.end)
    }

    /// Number of entries: the whole match plus every capture group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Always false: there is at least the whole-match entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans of every entry, whole match first.
    #[must_use]
    pub fn spans(&self) -> &[Option<Span>] {
        &self.spans
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    #[must_use]
    pub fn subject(&self) -> &'s H {
        self.subject
    }

    /// This match in the shape `findall` reports it. See [`Found`].
    #[must_use]
    pub fn found(&self) -> Found<'s, H> {
        match self.spans.len() {
            0 | 1 => self
                .get(0)
                .or_else(|| self.subject.slice(Span::default()))
                .map_or(Found::Group(None), Found::Whole),
            2 => Found::Group(self.group(1)),
            _ => Found::Groups(self.groups()),
        }
    }
}

impl<H: Haystack + ?Sized> Clone for Match<'_, H> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            subject: self.subject,
            spans: self.spans.clone(),
        }
    }
}

impl<H: Haystack + fmt::Debug + ?Sized> fmt::Debug for Match<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("pattern", &self.pattern.as_str())
            .field("spans", &self.spans)
            .field("groups", &(0..self.len()).map(|i| self.get(i)).collect::<Vec<_>>())
            .finish()
    }
}

/// What `findall` yields for one match.
///
/// The shape depends on the number of capture groups in the pattern: no
/// groups yields the whole match, exactly one group yields that group, and
/// two or more yield every group (whole match excluded).
#[derive(Debug, PartialEq, Eq)]
pub enum Found<'s, H: ?Sized = str> {
    Whole(&'s H),
    Group(Option<&'s H>),
    Groups(Vec<Option<&'s H>>),
}

impl<H: ?Sized> Clone for Found<'_, H> {
    fn clone(&self) -> Self {
        match self {
            Self::Whole(whole) => Self::Whole(*whole),
            Self::Group(group) => Self::Group(*group),
            Self::Groups(groups) => Self::Groups(groups.clone()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FindIter
// ═══════════════════════════════════════════════════════════════════════════════

/// Lazy sequence of the non-overlapping matches of a pattern.
///
/// The engine finds every match up front; each [`Match`] is built when it
/// is drawn. The engine's batch is released as soon as the iterator is
/// exhausted, or when it is dropped early.
pub struct FindIter<'s, H: Haystack + ?Sized = str> {
    pattern: Pattern,
    subject: &'s H,
    batch: Option<MultiMatchGuard>,
    next: usize,
}

impl<'s, H: Haystack + ?Sized> Iterator for FindIter<'s, H> {
    type Item = Result<Match<'s, H>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batch.as_ref()?;
        match batch.spans_at(self.next, self.subject) {
            Ok(Some(result)) => {
                self.next += 1;
                Some(Ok(Match::new(self.pattern.clone(), self.subject, result)))
            }
            Ok(None) => {
                self.batch = None;
                None
            }
            Err(err) => {
                self.batch = None;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.batch.as_ref().map_or(0, |b| b.len() - self.next);
        (0, Some(left))
    }
}

impl<H: Haystack + ?Sized> FusedIterator for FindIter<'_, H> {}

impl<H: Haystack + ?Sized> fmt::Debug for FindIter<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindIter")
            .field("pattern", &self.pattern.as_str())
            .field("next", &self.next)
            .field("len", &self.batch.as_ref().map(MultiMatchGuard::len))
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pattern operations
// ═══════════════════════════════════════════════════════════════════════════════

fn subject_bytes<H: Haystack + ?Sized>(subject: &H) -> Result<&[u8], Error> {
    let bytes = subject.as_bytes();
    if bytes.len() > MAX_SUBJECT_LEN {
        return Err(Error::SubjectTooLarge { len: bytes.len() });
    }
    Ok(bytes)
}

// Out-of-range positions become -1, which the engine treats as "no match".
fn start_position(start: usize) -> i32 {
    i32::try_from(start).unwrap_or(-1)
}

impl Pattern {
    fn find_single<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
        anchor: LINRE_ANCHOR,
        start: usize,
    ) -> Result<Option<Match<'s, H>>, Error> {
        let bytes = subject_bytes(subject)?;
        // SAFETY: the pattern handle and the subject outlive the call; the
        // result is owned by the guard.
        let guard = MatchGuard::new(unsafe {
            engine::linre_find_single(
                self.raw(),
                bytes.as_ptr(),
                bytes.len(),
                anchor,
                start_position(start),
            )
        });
        Ok(guard
            .spans(subject)?
            .map(|result| Match::new(self.clone(), subject, result)))
    }

    /// Finds the first match anywhere in `subject`.
    ///
    /// # Errors
    ///
    /// [`Error::SubjectTooLarge`] if `subject` is longer than
    /// [`MAX_SUBJECT_LEN`] bytes.
    pub fn search<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
    ) -> Result<Option<Match<'s, H>>, Error> {
        self.find_single(subject, LINRE_ANCHOR::UNANCHORED, 0)
    }

    /// Finds the first match starting at or after byte `start`. Offsets in
    /// the result are still relative to the start of `subject`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`].
    pub fn search_at<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
        start: usize,
    ) -> Result<Option<Match<'s, H>>, Error> {
        self.find_single(subject, LINRE_ANCHOR::UNANCHORED, start)
    }

    /// Matches at the start of `subject`. The match need not reach the end:
    /// `a+` matches the `aaa` of `aaab`.
    ///
    /// This is `re.match`; see [`Pattern::full_match`] for `re.fullmatch`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`].
    pub fn prefix_match<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
    ) -> Result<Option<Match<'s, H>>, Error> {
        self.find_single(subject, LINRE_ANCHOR::ANCHOR_START, 0)
    }

    /// Matches all of `subject`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`].
    pub fn full_match<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
    ) -> Result<Option<Match<'s, H>>, Error> {
        self.find_single(subject, LINRE_ANCHOR::ANCHOR_BOTH, 0)
    }

    /// Whether the pattern matches anywhere in `subject`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`].
    pub fn is_match<H: Haystack + ?Sized>(&self, subject: &H) -> Result<bool, Error> {
        self.search(subject).map(|m| m.is_some())
    }

    /// Every non-overlapping match, left to right, shaped as described on
    /// [`Found`].
    ///
    /// ```
    /// use linre::{Found, Pattern};
    ///
    /// let re = Pattern::new(r"(\w)=(\d)").unwrap();
    /// assert_eq!(
    ///     re.findall("a=1 b=2").unwrap(),
    ///     vec![
    ///         Found::Groups(vec![Some("a"), Some("1")]),
    ///         Found::Groups(vec![Some("b"), Some("2")]),
    ///     ]
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`].
    pub fn findall<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
    ) -> Result<Vec<Found<'s, H>>, Error> {
        self.finditer(subject)?
            .map(|m| m.map(|m| m.found()))
            .collect()
    }

    /// Lazy sequence of every non-overlapping match, left to right.
    ///
    /// Empty matches never stall the scan: after an empty match the next
    /// search starts one character further on.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`]. Conversion errors of individual matches are
    /// reported by the iterator.
    pub fn finditer<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
    ) -> Result<FindIter<'s, H>, Error> {
        self.finditer_at(subject, 0)
    }

    /// Like [`Pattern::finditer`], starting at byte `start`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::finditer`].
    pub fn finditer_at<'s, H: Haystack + ?Sized>(
        &self,
        subject: &'s H,
        start: usize,
    ) -> Result<FindIter<'s, H>, Error> {
        let bytes = subject_bytes(subject)?;
        // SAFETY: as in `find_single`.
        let batch = MultiMatchGuard::new(unsafe {
            engine::linre_find_all(
                self.raw(),
                bytes.as_ptr(),
                bytes.len(),
                LINRE_ANCHOR::UNANCHORED,
                start_position(start),
            )
        })?;
        Ok(FindIter {
            pattern: self.clone(),
            subject,
            batch: Some(batch),
            next: 0,
        })
    }

    /// Finds the first match and copies every group out of the subject.
    ///
    /// The returned values own their data and do not borrow `subject`.
    ///
    /// # Errors
    ///
    /// See [`Pattern::search`]. For text subjects, [`Error::Encoding`] if
    /// a group is not valid UTF-8.
    pub fn captures_owned<H: Haystack + ?Sized>(
        &self,
        subject: &H,
    ) -> Result<Option<MatchResult<H::Owned>>, Error> {
        let bytes = subject_bytes(subject)?;
        // SAFETY: as in `find_single`.
        let guard = TextMatchGuard::new(unsafe {
            engine::linre_find_single_copy(
                self.raw(),
                bytes.as_ptr(),
                bytes.len(),
                LINRE_ANCHOR::UNANCHORED,
                0,
            )
        });
        guard.decode::<H>()
    }
}
