//! Glob pattern matching for access policies.
//!
//! Patterns support three wildcards:
//!
//! - `**` matches any run of characters, including `/`
//! - `*` matches any run of characters within one path segment
//! - `?` matches exactly one character other than `/`
//!
//! Every other character is literal. Matching is anchored at both ends and
//! case-insensitive. The bare pattern `"*"` matches everything, including the
//! empty string, and never touches the regex engine.

use regex::{Regex, RegexBuilder};

use crate::error::GatewayError;

/// Longest pattern accepted by [`compile`], in characters.
pub const MAX_PATTERN_LEN: usize = 500;

/// Upper bound on a compiled pattern's program size.
const COMPILED_SIZE_LIMIT: usize = 10 * (1 << 20);

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// The `"*"` pattern.
    Any,
    Regex(Regex),
}

impl Matcher {
    #[inline]
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// Compile a glob pattern.
///
/// # Errors
///
/// Returns [`GatewayError::PatternTooLong`] for patterns over
/// [`MAX_PATTERN_LEN`] characters, and [`GatewayError::InvalidPattern`] if the
/// translated regex exceeds the compiled size limit.
pub fn compile(pattern: &str) -> Result<Matcher, GatewayError> {
    let len = pattern.chars().count();
    if len > MAX_PATTERN_LEN {
        return Err(GatewayError::PatternTooLong {
            len,
            max: MAX_PATTERN_LEN,
        });
    }
    if pattern == "*" {
        return Ok(Matcher::Any);
    }

    let regex = RegexBuilder::new(&glob_to_regex(pattern))
        .case_insensitive(true)
        .size_limit(COMPILED_SIZE_LIMIT)
        .build()?;
    Ok(Matcher::Regex(regex))
}

/// Translate a glob into an anchored regex source string.
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    let mut chars = pattern.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*?");
            }
            '*' => regex.push_str("[^/]*?"),
            '?' => regex.push_str("[^/]"),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }

    regex.push('$');
    regex
}

/// Returns `true` if `value` matches any of the raw glob `patterns`.
///
/// Patterns are compiled on each call; policies hold a pre-compiled
/// [`PatternSet`] instead. A pattern that fails to compile never matches.
pub fn matches_any<S: AsRef<str>>(value: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|pattern| {
        let pattern = pattern.as_ref();
        if pattern == "*" {
            return true;
        }
        match compile(pattern) {
            Ok(matcher) => matcher.is_match(value),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "skipping pattern that failed to compile");
                false
            }
        }
    })
}

/// A list of compiled patterns, matched in order.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    matchers: Vec<Matcher>,
}

impl PatternSet {
    /// A set holding only `"*"`.
    #[must_use]
    pub fn any() -> Self {
        Self {
            matchers: vec![Matcher::Any],
        }
    }

    /// Compile every pattern, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// See [`compile`].
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, GatewayError> {
        let matchers = patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}
