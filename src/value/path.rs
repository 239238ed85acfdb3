//! Dot/bracket parameter paths (`a.b[2]`)

use std::fmt;

use crate::{Error, Result};

/// One step of a [`ParameterPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Named key inside a map
    Key(String),
    /// Position inside a list
    Index(usize),
}

/// Parsed path addressing a node inside a [`Value`](super::Value) tree.
///
/// Grammar: `key ( '.' key | '[' index ']' )*`. The first segment is always
/// a key; it names the parameter itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterPath {
    segments: Vec<Segment>,
}

impl ParameterPath {
    /// Parse a path string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] on empty keys, unterminated or
    /// non-numeric brackets, or a leading index.
    ///
    /// # Example
    /// ```
    /// use trueno_lab::value::{ParameterPath, Segment};
    ///
    /// let p = ParameterPath::parse("times[2]").unwrap();
    /// assert_eq!(p.head(), Some("times"));
    /// assert_eq!(p.segments()[1], Segment::Index(2));
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidPath(format!("`{text}`: {why}"));
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = text.chars().peekable();
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_bracket {
                        return Err(invalid("empty key"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    if chars.peek().is_none() {
                        return Err(invalid("trailing dot"));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    if segments.is_empty() {
                        return Err(invalid("path must start with a key"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unterminated bracket")),
                        }
                    }
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid("index is not a non-negative integer"))?;
                    segments.push(Segment::Index(index));
                    after_bracket = true;
                }
                ']' => return Err(invalid("unmatched closing bracket")),
                other => {
                    if after_bracket {
                        return Err(invalid("expected `.` or `[` after index"));
                    }
                    key.push(other);
                }
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        if segments.is_empty() {
            return Err(invalid("empty path"));
        }
        Ok(Self { segments })
    }

    /// Path made of a single key (no parsing; the key may contain dots).
    #[must_use]
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Key(name.into())],
        }
    }

    /// Append an index segment.
    #[must_use]
    pub fn index(mut self, i: usize) -> Self {
        self.segments.push(Segment::Index(i));
        self
    }

    /// All segments, head first.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the parameter this path starts from.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Remainder after the head segment, if any.
    #[must_use]
    pub fn tail(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[1..].to_vec(),
        })
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if idx == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for ParameterPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_key() {
        let p = ParameterPath::parse("size").unwrap();
        assert_eq!(p.segments(), &[Segment::Key("size".into())]);
        assert!(p.tail().is_none());
    }

    #[test]
    fn test_parse_mixed() {
        let p = ParameterPath::parse("a.b[2].c[0][1]").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c".into()),
                Segment::Index(0),
                Segment::Index(1),
            ]
        );
        assert_eq!(p.to_string(), "a.b[2].c[0][1]");
    }

    #[test]
    fn test_tail_consumes_head() {
        let p = ParameterPath::parse("times[3]").unwrap();
        assert_eq!(p.head(), Some("times"));
        let tail = p.tail().unwrap();
        assert_eq!(tail.segments(), &[Segment::Index(3)]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", ".a", "a.", "a..b", "[0]", "a[", "a[x]", "a]", "a[1]b", "a[-1]"] {
            assert!(ParameterPath::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_key_constructor_does_not_split() {
        let p = ParameterPath::key("a.b");
        assert_eq!(p.segments().len(), 1);
        assert_eq!(p.clone().index(4).segments()[1], Segment::Index(4));
    }
}
