//! Datapoint identifiers used by explain front ends
//!
//! | Form | Meaning |
//! |---|---|
//! | `E7` | experiment 7 |
//! | `E7:time` | parameter `time` of experiment 7 |
//! | `E7:time:2` | element 2 of list parameter `time` |
//! | `T3` | table 3 |
//! | `T3:2:0` | cell at row 2, column 0 of table 3 |
//! | `C1` | claim 1 |
//! | `E7:'2'` | parameter named `2` of experiment 7 |
//!
//! A parameter name that is empty, all digits, contains `:` or starts with
//! `'` is written between single quotes, with inner quotes doubled
//! (`'it''s'`). Every [`PartRef`] therefore parses back from its text.

use std::fmt;
use std::str::FromStr;

use super::{Part, PartRef, PartSegment, Subject};
use crate::claim::ClaimId;
use crate::experiment::ExperimentId;
use crate::table::TableId;
use crate::{Error, Result};

const SEPARATOR: char = ':';
const QUOTE: char = '\'';

/// One `:`-separated field after the subject.
struct Field {
    text: String,
    quoted: bool,
}

/// Split the fields following the subject; `None` on an empty field or an
/// unterminated quote.
fn split_fields(text: &str) -> Option<Vec<Field>> {
    let mut fields = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        let mut field = Field {
            text: String::new(),
            quoted: chars.peek() == Some(&QUOTE),
        };
        if field.quoted {
            chars.next();
            loop {
                match chars.next()? {
                    QUOTE if chars.peek() == Some(&QUOTE) => {
                        chars.next();
                        field.text.push(QUOTE);
                    }
                    QUOTE => break,
                    c => field.text.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != SEPARATOR) {
                field.text.push(c);
            }
            if field.text.is_empty() {
                return None;
            }
        }
        fields.push(field);
        match chars.next() {
            None => return Some(fields),
            Some(SEPARATOR) => {}
            Some(_) => return None,
        }
    }
}

fn is_index(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn needs_quotes(name: &str) -> bool {
    name.is_empty() || is_index(name) || name.contains(SEPARATOR) || name.starts_with(QUOTE)
}

impl PartRef {
    /// Parse a datapoint identifier.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDatapoint`] on an unknown prefix, a non-numeric id,
    /// or segments the subject kind does not support.
    ///
    /// # Example
    /// ```
    /// use trueno_lab::provenance::PartRef;
    /// use trueno_lab::table::TableId;
    ///
    /// let cell = PartRef::parse_datapoint("T3:2:0").unwrap();
    /// assert_eq!(cell, PartRef::cell(TableId::new(3), 2, 0));
    /// assert_eq!(cell.to_string(), "T3:2:0");
    /// ```
    pub fn parse_datapoint(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidDatapoint(text.to_string());
        let (head, rest) = match text.split_once(SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (text, None),
        };
        let mut chars = head.chars();
        let prefix = chars.next().ok_or_else(invalid)?;
        let raw: u64 = chars.as_str().parse().map_err(|_| invalid())?;
        let fields = match rest {
            Some(rest) => split_fields(rest).ok_or_else(invalid)?,
            None => Vec::new(),
        };

        match prefix {
            'E' => {
                let segments = fields
                    .into_iter()
                    .map(|f| match f.text.parse::<usize>() {
                        Ok(i) if !f.quoted && is_index(&f.text) => PartSegment::Index(i),
                        _ => PartSegment::Parameter(f.text),
                    })
                    .collect::<Vec<_>>();
                if matches!(segments.first(), Some(PartSegment::Index(_))) {
                    return Err(invalid());
                }
                Ok(Self::new(
                    Subject::Experiment(ExperimentId::new(raw)),
                    Part::from_segments(segments),
                ))
            }
            'T' => match fields.as_slice() {
                [] => Ok(Self::whole(Subject::Table(TableId::new(raw)))),
                [row, col] if !row.quoted && !col.quoted => {
                    let row = row.text.parse().map_err(|_| invalid())?;
                    let col = col.text.parse().map_err(|_| invalid())?;
                    Ok(Self::cell(TableId::new(raw), row, col))
                }
                _ => Err(invalid()),
            },
            'C' if fields.is_empty() => Ok(Self::claim(ClaimId::new(raw))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)?;
        for segment in self.part.segments() {
            match segment {
                PartSegment::Parameter(k) if needs_quotes(k) => {
                    let escaped = k.replace(QUOTE, "''");
                    write!(f, "{SEPARATOR}{QUOTE}{escaped}{QUOTE}")?;
                }
                PartSegment::Parameter(k) => write!(f, "{SEPARATOR}{k}")?,
                PartSegment::Index(i) => write!(f, "{SEPARATOR}{i}")?,
                PartSegment::Cell { row, col } => write!(f, "{SEPARATOR}{row}{SEPARATOR}{col}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PartRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_datapoint(s)
    }
}
