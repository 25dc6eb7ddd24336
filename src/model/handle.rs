//! Dataset handles: `author/name[.format][@tag]`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed dataset reference
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub author: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn is_tag(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

impl Handle {
    /// Parse and validate a handle string
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidHandle(s.to_string());

        let (rest, tag) = match s.split_once('@') {
            Some((rest, tag)) => (rest, Some(tag)),
            None => (s, None),
        };
        let (author, rest) = rest.split_once('/').ok_or_else(invalid)?;
        let (name, format) = match rest.split_once('.') {
            Some((name, format)) => (name, Some(format)),
            None => (rest, None),
        };

        if !is_ident(author) || !is_ident(name) {
            return Err(invalid());
        }
        if format.is_some_and(|f| !is_ident(f)) || tag.is_some_and(|t| !is_tag(t)) {
            return Err(invalid());
        }

        Ok(Handle {
            author: author.to_string(),
            name: name.to_string(),
            format: format.map(str::to_string),
            tag: tag.map(str::to_string),
        })
    }

    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// `author/name`, without format or tag
    pub fn dataset(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Handle::parse(s)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.name)?;
        if let Some(format) = &self.format {
            write!(f, ".{}", format)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, "@{}", tag)?;
        }
        Ok(())
    }
}
