//! Substitution: rewrite templates run inside the engine, callbacks run
//! on the host.

use crate::engine;
use crate::marshal::StringGuard;
use crate::{Error, Haystack, Match, Pattern, MAX_SUBJECT_LEN};

impl Pattern {
    /// Replaces every non-overlapping match in `subject` with `rewrite`.
    ///
    /// `rewrite` may refer to groups as `\0` to `\9`; `\\` is a literal
    /// backslash. An empty match right after the previous match is left
    /// alone, so `b*` over `abc` with `-` gives `-a-c-`.
    ///
    /// ```
    /// use linre::Pattern;
    ///
    /// let re = Pattern::new("b+").unwrap();
    /// assert_eq!(re.sub("", "abbcbbd").unwrap(), "acd");
    /// assert_eq!(re.sub(r"<\0>", "abbc").unwrap(), "a<bb>c");
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRewrite`] if `rewrite` uses any other escape or
    ///   names a group the pattern does not have.
    /// - [`Error::SubjectTooLarge`] for subjects over [`MAX_SUBJECT_LEN`]
    ///   bytes.
    /// - [`Error::Encoding`] if a text result is not valid UTF-8, which
    ///   can only happen when a group boundary splits a character.
    pub fn sub<H: Haystack + ?Sized>(&self, rewrite: &H, subject: &H) -> Result<H::Owned, Error> {
        let data = subject.as_bytes();
        if data.len() > MAX_SUBJECT_LEN {
            return Err(Error::SubjectTooLarge { len: data.len() });
        }
        let rewrite = rewrite.as_bytes();

        // SAFETY: every pointer outlives the call; the result is owned by the
        // guard.
        let raw = unsafe {
            engine::linre_global_replace(
                self.raw(),
                data.as_ptr(),
                data.len(),
                rewrite.as_ptr(),
                rewrite.len(),
            )
        };
        let Some(result) = StringGuard::new(raw) else {
            return Err(Error::InvalidRewrite {
                rewrite: String::from_utf8_lossy(rewrite).into_owned(),
            });
        };
        result.decode::<H>("replacement")
    }

    /// Replaces every non-overlapping match with the value `replace`
    /// returns for it.
    ///
    /// ```
    /// use linre::Pattern;
    ///
    /// let re = Pattern::new("a(b+)").unwrap();
    /// let out = re
    ///     .sub_with(|m| format!("a{}", m.group(1).unwrap_or("").to_uppercase()), "abbcdefabbbbca")
    ///     .unwrap();
    /// assert_eq!(out, "aBBcdefaBBBBca");
    /// ```
    ///
    /// # Errors
    ///
    /// See [`Pattern::try_sub_with`].
    pub fn sub_with<'s, H, F, R>(&self, mut replace: F, subject: &'s H) -> Result<H::Owned, Error>
    where
        H: Haystack + ?Sized,
        F: FnMut(&Match<'s, H>) -> R,
        R: AsRef<H>,
    {
        self.try_sub_with(|m| Ok::<R, Error>(replace(m)), subject)
    }

    /// Like [`Pattern::sub_with`], with a callback that can fail. The first
    /// callback error is returned as is.
    ///
    /// Every match is found against the original `subject` before the first
    /// callback runs. Replacements are then spliced into a copy left to
    /// right; a running offset (the total length change so far) maps each
    /// original span onto the edited copy.
    ///
    /// # Errors
    ///
    /// Errors of the callback, and errors of [`Pattern::finditer`] converted
    /// through `From<Error>`.
    pub fn try_sub_with<'s, H, F, R, E>(&self, mut replace: F, subject: &'s H) -> Result<H::Owned, E>
    where
        H: Haystack + ?Sized,
        F: FnMut(&Match<'s, H>) -> Result<R, E>,
        R: AsRef<H>,
        E: From<Error>,
    {
        let matches = self.finditer(subject)?.collect::<Result<Vec<_>, Error>>()?;

        let mut replacements = Vec::with_capacity(matches.len());
        for m in &matches {
            replacements.push(replace(m)?);
        }

        let mut out = ToOwned::to_owned(subject);
        let mut offset: isize = 0;
        for (m, replacement) in matches.iter().zip(&replacements) {
            let Some(span) = m.span(0) else {
                continue;
            };
            let replacement = replacement.as_ref();
            let start = shifted(span.start, offset)?;
            let end = shifted(span.end, offset)?;
            H::splice(&mut out, start..end, replacement);
            offset += length_delta(replacement.as_bytes().len(), span.len())?;
        }
        Ok(out)
    }
}

fn shifted(at: usize, offset: isize) -> Result<usize, Error> {
    at.checked_add_signed(offset).ok_or(Error::MalformedResult {
        reason: "replacement offset out of range",
    })
}

fn length_delta(replacement: usize, original: usize) -> Result<isize, Error> {
    let overflow = || Error::SubjectTooLarge {
        len: replacement.max(original),
    };
    let replacement = isize::try_from(replacement).map_err(|_| overflow())?;
    let original = isize::try_from(original).map_err(|_| overflow())?;
    Ok(replacement - original)
}
