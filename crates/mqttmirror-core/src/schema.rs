//! Table naming shared by every backend.
//!
//! The base name is configurable; the history table and the view derive
//! from it. Names end up interpolated into SQL, so only plain identifiers
//! are accepted.

use crate::{Error, Result};

pub const DEFAULT_TABLE: &str = "mqtt";

const MAX_BASE_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
  pub topics:  String,
  pub history: String,
  pub view:    String,
}

impl TableNames {
  pub fn new(base: &str) -> Result<Self> {
    if !is_identifier(base) {
      return Err(Error::InvalidTableName(base.to_owned()));
    }
    Ok(Self {
      topics:  base.to_owned(),
      history: format!("{base}_history"),
      view:    format!("{base}_history_view"),
    })
  }
}

impl Default for TableNames {
  fn default() -> Self {
    Self {
      topics:  DEFAULT_TABLE.to_owned(),
      history: format!("{DEFAULT_TABLE}_history"),
      view:    format!("{DEFAULT_TABLE}_history_view"),
    }
  }
}

fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  let Some(first) = chars.next() else { return false };
  s.len() <= MAX_BASE_LEN
    && (first.is_ascii_alphabetic() || first == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
