//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs them against linre. A fixture compiles one
//! pattern and runs a list of cases against it; each case names an
//! operation with `op`:
//!
//! ```yaml
//! name: search_basic
//! description: group 0 is the whole match
//! pattern: a(b+)
//! cases:
//!   - name: finds the first occurrence
//!     op: search
//!     subject: xabbc
//!     expect: [abb, bb]
//!     spans: [[1, 4], [2, 4]]
//!   - name: template
//!     op: sub
//!     subject: abbcabd
//!     rewrite: '<\1>'
//!     expect: <bb>c<b>d
//! ```
//!
//! A fixture with `compile_error` expects compilation to fail with a
//! message containing that text.

use linre::{CompileOptions, Error, Found, Match, Pattern, Span};
use serde::Deserialize;

use crate::Callback;

/// A complete test fixture
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub options: CompileOptions,
    #[serde(default)]
    pub compile_error: Option<String>,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// Test case
#[derive(Debug, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub subject: String,
    #[serde(flatten)]
    pub op: Operation,
}

/// Groups of a single match, whole match first; `null` for a group that did
/// not participate.
pub type Groups = Vec<Option<String>>;

/// The operation a case runs, with its expectation.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// `expect: null` means no match.
    Search {
        expect: Option<Groups>,
        #[serde(default)]
        spans: Option<Vec<Option<(usize, usize)>>>,
    },
    Match {
        expect: Option<Groups>,
    },
    Fullmatch {
        expect: Option<Groups>,
    },
    Findall {
        expect: Vec<Item>,
    },
    /// Either `expect` (the result) or `error` (text the error message
    /// must contain).
    Sub {
        rewrite: String,
        #[serde(default)]
        expect: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    SubWith {
        callback: Callback,
        expect: String,
    },
}

/// One `findall` item: a string (or `null`), or a list for two or more
/// groups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Groups(Vec<Option<String>>),
    Text(Option<String>),
}

impl From<Found<'_>> for Item {
    fn from(found: Found<'_>) -> Self {
        match found {
            Found::Whole(whole) => Self::Text(Some(whole.to_string())),
            Found::Group(group) => Self::Text(group.map(str::to_string)),
            Found::Groups(groups) => {
                Self::Groups(groups.into_iter().map(|g| g.map(str::to_string)).collect())
            }
        }
    }
}

fn groups_of(m: &Match<'_>) -> Groups {
    (0..m.len()).map(|i| m.group(i).map(str::to_string)).collect()
}

fn spans_of(m: &Match<'_>) -> Vec<Option<(usize, usize)>> {
    m.spans()
        .iter()
        .map(|span| span.map(|Span { start, end }| (start, end)))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

impl CaseResult {
    fn compare<T: PartialEq + std::fmt::Debug>(name: &str, expected: &T, actual: &T) -> Self {
        Self {
            case_name: name.to_string(),
            passed: expected == actual,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    fn failed(name: &str, expected: impl std::fmt::Debug, err: &Error) -> Self {
        Self {
            case_name: name.to_string(),
            passed: false,
            expected: format!("{expected:?}"),
            actual: format!("error: {err}"),
        }
    }
}

impl TestCase {
    fn single(&self, found: Result<Option<Match<'_>>, Error>, expect: &Option<Groups>) -> CaseResult {
        match found {
            Ok(m) => CaseResult::compare(&self.name, expect, &m.as_ref().map(groups_of)),
            Err(err) => CaseResult::failed(&self.name, expect, &err),
        }
    }

    fn run(&self, re: &Pattern) -> CaseResult {
        let subject = self.subject.as_str();

        match &self.op {
            Operation::Search { expect, spans } => {
                let found = re.search(subject);
                if let (Some(spans), Ok(Some(m))) = (spans, &found) {
                    let actual = spans_of(m);
                    if spans != &actual {
                        return CaseResult::compare(&self.name, spans, &actual);
                    }
                }
                self.single(found, expect)
            }
            Operation::Match { expect } => self.single(re.prefix_match(subject), expect),
            Operation::Fullmatch { expect } => self.single(re.full_match(subject), expect),
            Operation::Findall { expect } => match re.findall(subject) {
                Ok(found) => {
                    let actual: Vec<Item> = found.into_iter().map(Item::from).collect();
                    CaseResult::compare(&self.name, expect, &actual)
                }
                Err(err) => CaseResult::failed(&self.name, expect, &err),
            },
            Operation::Sub {
                rewrite,
                expect,
                error,
            } => {
                let actual = re.sub(rewrite.as_str(), subject);
                match (error, actual) {
                    (Some(want), Err(err)) => CaseResult {
                        case_name: self.name.clone(),
                        passed: err.to_string().contains(want.as_str()),
                        expected: format!("error containing {want:?}"),
                        actual: err.to_string(),
                    },
                    (Some(want), Ok(out)) => CaseResult {
                        case_name: self.name.clone(),
                        passed: false,
                        expected: format!("error containing {want:?}"),
                        actual: format!("{out:?}"),
                    },
                    (None, Ok(out)) => CaseResult::compare(&self.name, expect, &Some(out)),
                    (None, Err(err)) => CaseResult::failed(&self.name, expect, &err),
                }
            }
            Operation::SubWith { callback, expect } => {
                match re.sub_with(|m| callback.apply(m), subject) {
                    Ok(actual) => CaseResult::compare(&self.name, expect, &actual),
                    Err(err) => CaseResult::failed(&self.name, expect, &err),
                }
            }
        }
    }
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Run all test cases and return results
    pub fn run(&self) -> Vec<CaseResult> {
        let compiled = Pattern::with_options(&self.pattern, self.options);

        match (&self.compile_error, compiled) {
            (Some(want), Err(err)) => vec![CaseResult {
                case_name: "compile".to_string(),
                passed: err.to_string().contains(want.as_str()),
                expected: format!("error containing {want:?}"),
                actual: err.to_string(),
            }],
            (Some(want), Ok(re)) => vec![CaseResult {
                case_name: "compile".to_string(),
                passed: false,
                expected: format!("error containing {want:?}"),
                actual: format!("{re:?}"),
            }],
            (None, Err(err)) => vec![CaseResult::failed("compile", &self.pattern, &err)],
            (None, Ok(re)) => self.cases.iter().map(|case| case.run(&re)).collect(),
        }
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        let results = self.run();
        for result in results {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {}, got {}",
                self.name, result.case_name, result.expected, result.actual
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: parse_check
pattern: 'a(b+)'
cases:
  - name: search
    op: search
    subject: xabbc
    expect: [abb, bb]
    spans: [[1, 4], [2, 4]]
  - name: no match
    op: match
    subject: xabbc
    expect: null
  - name: findall
    op: findall
    subject: abab
    expect: [b, b]
  - name: template
    op: sub
    subject: abbc
    rewrite: '\1'
    expect: bbc
  - name: callback
    op: sub_with
    subject: abbc
    callback: { kind: upper }
    expect: ABBc
---
name: lookbehind
pattern: '(?<![xy])a'
compile_error: look-around
"#;

    #[test]
    fn parses_and_runs() {
        let fixtures = Fixture::from_yaml_multi(YAML).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].cases.len(), 5);
        for fixture in &fixtures {
            fixture.run_and_assert();
        }
    }

    #[test]
    fn reports_mismatches() {
        let fixture = Fixture::from_yaml(
            r#"
name: wrong
pattern: b
cases:
  - name: miscounted
    op: findall
    subject: bb
    expect: [b]
"#,
        )
        .unwrap();
        let results = fixture.run();
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].actual, r#"[Text(Some("b")), Text(Some("b"))]"#);
    }
}
