//! Design formula parsing
//!
//! Supported grammar: `~ term (+ term)*` where a term is `1`, a covariate
//! name, an interaction `a:b`, or `a*b` (shorthand for `a + b + a:b`).
//! The intercept is always included.

use std::fmt;

use crate::error::{DiffExprError, Result};

/// A main effect (one covariate) or an interaction of several covariates.
#[derive(Debug, Clone, Eq)]
pub struct Term {
    factors: Vec<String>,
}

impl Term {
    pub fn new<S: Into<String>>(factors: impl IntoIterator<Item = S>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for f in factors {
            let f = f.into();
            if !out.contains(&f) {
                out.push(f);
            }
        }
        Self { factors: out }
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn is_interaction(&self) -> bool {
        self.factors.len() > 1
    }

    fn sorted(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.factors.iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }
}

/// `a:b` and `b:a` are the same term.
impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factors.join(":"))
    }
}

/// Parsed right-hand side of a design formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    terms: Vec<Term>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.chars().next().map_or(false, |c| c.is_ascii_digit())
}

impl Formula {
    /// Parse a formula such as `~ batch + condition + batch:condition`.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: String| DiffExprError::InvalidDesign { reason };

        let body = source
            .trim()
            .strip_prefix('~')
            .ok_or_else(|| invalid(format!("formula '{}' must start with '~'", source)))?
            .trim();
        if body.is_empty() {
            return Err(invalid(format!("formula '{}' has no terms", source)));
        }

        fn push(term: Term, terms: &mut Vec<Term>) {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }

        let mut terms: Vec<Term> = Vec::new();

        for raw in body.split('+') {
            let raw = raw.trim();
            match raw {
                "1" => continue,
                "" => return Err(invalid(format!("empty term in formula '{}'", source))),
                "0" | "-1" => {
                    return Err(invalid(format!(
                        "formula '{}': models without an intercept are not supported",
                        source
                    )))
                }
                _ => {}
            }

            if raw.contains('*') {
                let parts: Vec<&str> = raw.split('*').map(str::trim).collect();
                if let Some(bad) = parts.iter().find(|p| !valid_name(p)) {
                    return Err(invalid(format!("invalid covariate name '{}' in '{}'", bad, source)));
                }
                // all non-empty subsets, lower order first
                let n = parts.len();
                let mut subsets: Vec<Vec<&str>> = (1u32..(1 << n))
                    .map(|mask| (0..n).filter(|i| mask & (1 << i) != 0).map(|i| parts[i]).collect())
                    .collect();
                subsets.sort_by_key(|s| s.len());
                for subset in subsets {
                    push(Term::new(subset), &mut terms);
                }
            } else {
                let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
                if let Some(bad) = parts.iter().find(|p| !valid_name(p)) {
                    return Err(invalid(format!("invalid covariate name '{}' in '{}'", bad, source)));
                }
                push(Term::new(parts), &mut terms);
            }
        }

        Ok(Self {
            source: source.trim().to_string(),
            terms,
        })
    }

    /// Non-intercept terms in formula order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.terms.contains(term)
    }

    /// `true` when every term of `self` is also a term of `other`.
    pub fn is_subset_of(&self, other: &Formula) -> bool {
        self.terms.iter().all(|t| other.contains(t))
    }

    /// Distinct covariate names referenced by any term.
    pub fn covariates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for term in &self.terms {
            for f in term.factors() {
                if !names.contains(&f.as_str()) {
                    names.push(f);
                }
            }
        }
        names
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_effects() {
        let f = Formula::parse("~ batch + condition").unwrap();
        assert_eq!(f.terms().len(), 2);
        assert_eq!(f.covariates(), vec!["batch", "condition"]);
    }

    #[test]
    fn test_parse_intercept_only() {
        let f = Formula::parse("~1").unwrap();
        assert!(f.terms().is_empty());
    }

    #[test]
    fn test_star_expands() {
        let f = Formula::parse("~ a*b").unwrap();
        let expected = Formula::parse("~ a + b + a:b").unwrap();
        assert_eq!(f.terms(), expected.terms());
    }

    #[test]
    fn test_interaction_order_insensitive() {
        let f = Formula::parse("~ a + b + b:a").unwrap();
        assert!(f.contains(&Term::new(["a", "b"])));
    }

    #[test]
    fn test_subset() {
        let full = Formula::parse("~ batch + condition").unwrap();
        let reduced = Formula::parse("~ batch").unwrap();
        assert!(reduced.is_subset_of(&full));
        assert!(!full.is_subset_of(&reduced));
    }

    #[test]
    fn test_malformed_formulas() {
        assert!(Formula::parse("condition").is_err());
        assert!(Formula::parse("~ a + + b").is_err());
        assert!(Formula::parse("~ 0 + a").is_err());
        assert!(Formula::parse("~ a-b").is_err());
    }
}
