// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key patterns for bulk invalidation.

use std::{fmt::Display, str::FromStr};

use regex::Regex;

use crate::Error;

/// A pattern matched against whole keys.
///
/// Patterns are usually written as globs, where `*` matches any run of characters and `?`
/// matches exactly one. Every other character matches itself. For anything more elaborate,
/// [`KeyPattern::regex`] accepts a regular expression directly.
///
/// # Examples
///
/// ```
/// use tierstore_tier::KeyPattern;
///
/// let pattern = KeyPattern::glob("user:*:session")?;
/// assert!(pattern.matches("user:42:session"));
/// assert!(!pattern.matches("user:42:profile"));
/// # Ok::<(), tierstore_tier::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the translated expression exceeds the regex size limits.
    pub fn glob(pattern: &str) -> Result<Self, Error> {
        let mut expr = String::with_capacity(pattern.len() + 2);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&expr).map_err(Error::caused_by)?,
        })
    }

    /// Compiles a regular expression. The expression is not anchored implicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if `expr` is not a valid regular expression.
    pub fn regex(expr: &str) -> Result<Self, Error> {
        Ok(Self {
            source: expr.to_string(),
            regex: Regex::new(expr).map_err(Error::caused_by)?,
        })
    }

    /// Returns `true` when `key` matches this pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// Returns the pattern as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for KeyPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::glob(s)
    }
}

impl Display for KeyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
