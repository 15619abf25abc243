//! Process-wide engine settings and deserializable options.
//!
//! # Memory budget
//!
//! The engine caps the memory each compiled pattern may use. The cap is read
//! when a pattern is compiled, so set it before compiling any pattern that
//! needs a different one. Patterns already compiled keep their budget.
//!
//! ```
//! use linre::{max_memory_budget, set_max_memory_budget, DEFAULT_MAX_MEMORY};
//!
//! assert_eq!(max_memory_budget(), DEFAULT_MAX_MEMORY);
//! set_max_memory_budget(256 * 1024 * 1024);
//! assert_eq!(max_memory_budget(), 256 * 1024 * 1024);
//! ```
//!
//! # Options from config files
//!
//! With the `serde` feature, [`CompileOptions`](crate::CompileOptions) and
//! [`Flags`] deserialize from any serde format. Flags are either the raw bits
//! or a list of names:
//!
//! ```yaml
//! flags: [IGNORECASE, MULTILINE]   # or: flags: 10
//! compat_comment: true
//! ```

use log::debug;

use crate::engine;
#[cfg(feature = "serde")]
use crate::Flags;

/// Sets the memory budget, in bytes, for patterns compiled from now on.
///
/// Values above `i64::MAX` are clamped.
pub fn set_max_memory_budget(bytes: usize) {
    let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
    if engine::linre_set_max_memory(bytes) {
        debug!("memory budget for new patterns set to {bytes} bytes");
    }
}

/// The memory budget, in bytes, applied to newly compiled patterns.
#[must_use]
pub fn max_memory_budget() -> usize {
    usize::try_from(engine::linre_max_memory()).unwrap_or(usize::MAX)
}

#[cfg(feature = "serde")]
fn flag_by_name(name: &str) -> Option<Flags> {
    const NAMES: [(&str, &str, Flags); 6] = [
        ("I", "IGNORECASE", Flags::IGNORECASE),
        ("L", "LOCALE", Flags::LOCALE),
        ("M", "MULTILINE", Flags::MULTILINE),
        ("S", "DOTALL", Flags::DOTALL),
        ("U", "UNICODE", Flags::UNICODE),
        ("X", "VERBOSE", Flags::VERBOSE),
    ];
    NAMES
        .iter()
        .find(|(short, long, _)| name.eq_ignore_ascii_case(short) || name.eq_ignore_ascii_case(long))
        .map(|(_, _, flag)| *flag)
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Flags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bits(u32),
            Names(Vec<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bits(bits) => Ok(Flags::from_bits(bits)),
            Repr::Names(names) => names.iter().try_fold(Flags::empty(), |flags, name| {
                flag_by_name(name)
                    .map(|flag| flags | flag)
                    .ok_or_else(|| serde::de::Error::custom(format!("unknown flag {name:?}")))
            }),
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::CompileOptions;

    #[test]
    fn flags_from_bits_or_names() {
        let bits: Flags = serde_json::from_str("10").unwrap();
        assert_eq!(bits, Flags::IGNORECASE | Flags::MULTILINE);

        let names: Flags = serde_json::from_str(r#"["i", "DOTALL"]"#).unwrap();
        assert_eq!(names, Flags::IGNORECASE | Flags::DOTALL);

        let err = serde_json::from_str::<Flags>(r#"["ASCII"]"#).unwrap_err();
        assert!(err.to_string().contains("ASCII"), "{err}");
    }

    #[test]
    fn options_default_missing_fields() {
        let options: CompileOptions = serde_json::from_str(r#"{"compat_comment": true}"#).unwrap();
        assert_eq!(options, CompileOptions::new().compat_comment(true));

        let options: CompileOptions = serde_json::from_str(r#"{"flags": ["IGNORECASE"]}"#).unwrap();
        assert!(options.is_case_insensitive());

        assert!(serde_json::from_str::<CompileOptions>(r#"{"verbose": true}"#).is_err());
    }
}
