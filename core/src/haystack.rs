//! `Haystack`: text or bytes, as seen by the engine.
//!
//! The engine only ever sees bytes. A haystack knows how to hand its bytes
//! over, how to cut a [`Span`] back out of itself, and how to turn engine
//! output into its owned form. `str` checks UTF-8 on the way back; `[u8]`
//! takes bytes as they are.

use std::ops::Range;

use crate::{Error, Span};

/// A subject, pattern or rewrite the engine can work on.
///
/// Implemented for `str` (owned form `String`) and `[u8]` (owned form
/// `Vec<u8>`).
pub trait Haystack: ToOwned {
    /// The bytes handed to the engine.
    fn as_bytes(&self) -> &[u8];

    /// The part of `self` covered by `span`, or `None` if the span is out of
    /// bounds or does not fall on a character boundary.
    fn slice(&self, span: Span) -> Option<&Self>;

    /// Turns bytes produced by the engine into an owned value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the bytes are not valid for this kind
    /// of haystack.
    fn decode(bytes: Vec<u8>, what: &'static str) -> Result<Self::Owned, Error>;

    /// Replaces `range` of `buf` with `with`.
    ///
    /// `range` must lie within `buf` (and on character boundaries for text).
    fn splice(buf: &mut Self::Owned, range: Range<usize>, with: &Self);
}

impl Haystack for str {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }

    fn slice(&self, span: Span) -> Option<&Self> {
        self.get(span.range())
    }

    fn decode(bytes: Vec<u8>, what: &'static str) -> Result<String, Error> {
        String::from_utf8(bytes).map_err(|err| Error::Encoding {
            what,
            offset: err.utf8_error().valid_up_to(),
        })
    }

    fn splice(buf: &mut String, range: Range<usize>, with: &Self) {
        buf.replace_range(range, with);
    }
}

impl Haystack for [u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn slice(&self, span: Span) -> Option<&Self> {
        self.get(span.range())
    }

    fn decode(bytes: Vec<u8>, _what: &'static str) -> Result<Vec<u8>, Error> {
        Ok(bytes)
    }

    fn splice(buf: &mut Vec<u8>, range: Range<usize>, with: &Self) {
        buf.splice(range, with.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_slices_only_on_char_boundaries() {
        let text = "梦幻";
        assert_eq!(text.slice(Span::new(0, 3)), Some("梦"));
        assert_eq!(text.slice(Span::new(1, 3)), None);
        assert_eq!(text.slice(Span::new(3, 9)), None);
    }

    #[test]
    fn bytes_slice_anywhere_in_bounds() {
        let data: &[u8] = "梦幻".as_bytes();
        assert_eq!(data.slice(Span::new(1, 3)), Some(&data[1..3]));
        assert_eq!(data.slice(Span::new(5, 7)), None);
    }

    #[test]
    fn str_decode_rejects_invalid_utf8() {
        let err = <str as Haystack>::decode(vec![b'a', 0xFF], "replacement").unwrap_err();
        assert_eq!(
            err,
            Error::Encoding {
                what: "replacement",
                offset: 1
            }
        );
        assert_eq!(<[u8] as Haystack>::decode(vec![0xFF], "x").unwrap(), vec![0xFF]);
    }

    #[test]
    fn splice_replaces_in_place() {
        let mut text = String::from("abbc");
        <str as Haystack>::splice(&mut text, 1..3, "X");
        assert_eq!(text, "aXc");

        let mut data = b"abbc".to_vec();
        <[u8] as Haystack>::splice(&mut data, 1..3, b"XYZ");
        assert_eq!(data, b"aXYZc");
    }
}
