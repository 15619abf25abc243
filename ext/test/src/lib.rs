//! linre-test: Conformance fixtures for linre
//!
//! Provides the callbacks fixtures can name for callback substitution, and
//! (feature `fixtures`) the YAML fixture runner.
//!
//! # Example
//!
//! ```
//! use linre_test::prelude::*;
//!
//! let re = Pattern::new("a(b+)").unwrap();
//! let callback = Callback::Lookup {
//!     table: [("abb", "aX"), ("abbbb", "aY")]
//!         .into_iter()
//!         .map(|(k, v)| (k.to_string(), v.to_string()))
//!         .collect(),
//! };
//! let out = re.sub_with(|m| callback.apply(m), "abbcdefabbbbca").unwrap();
//! assert_eq!(out, "aXcdefaYca");
//! ```

use linre::Match;
use std::collections::HashMap;

#[cfg(feature = "fixtures")]
pub mod fixture;

/// A replacement callback a fixture can name.
///
/// In YAML: `{ kind: upper }`, `{ kind: length }`,
/// `{ kind: lookup, table: { abb: aX } }`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "fixtures", derive(serde::Deserialize))]
#[cfg_attr(
    feature = "fixtures",
    serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)
)]
pub enum Callback {
    /// The whole match, uppercased.
    Upper,
    /// The length of the whole match in bytes, in decimal.
    Length,
    /// The table entry for the whole match, or the match itself if there is
    /// none.
    Lookup {
        table: HashMap<String, String>,
    },
}

impl Callback {
    /// The replacement for `m`.
    #[must_use]
    pub fn apply(&self, m: &Match<'_>) -> String {
        let whole = m.group(0).unwrap_or_default();
        match self {
            Self::Upper => whole.to_uppercase(),
            Self::Length => whole.len().to_string(),
            Self::Lookup { table } => table.get(whole).map_or(whole, String::as_str).to_string(),
        }
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::Callback;
    pub use linre::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use linre::Pattern;

    #[test]
    fn callbacks() {
        let re = Pattern::new("b+").unwrap();
        let m = re.search("abbc").unwrap().unwrap();

        assert_eq!(Callback::Upper.apply(&m), "BB");
        assert_eq!(Callback::Length.apply(&m), "2");

        let table = HashMap::from([("bb".to_string(), "X".to_string())]);
        assert_eq!(Callback::Lookup { table }.apply(&m), "X");
        assert_eq!(
            Callback::Lookup {
                table: HashMap::new()
            }
            .apply(&m),
            "bb"
        );
    }
}
