//! Topics dropped before they reach the coordinator.

use std::collections::HashSet;

/// Exact-match exclusion list. Wildcards are not interpreted.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
  exclude: HashSet<String>,
}

impl TopicFilter {
  pub fn new<I, T>(exclude: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    Self {
      exclude: exclude.into_iter().map(Into::into).collect(),
    }
  }

  pub fn allows(&self, topic: &str) -> bool { !self.exclude.contains(topic) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_match_only() {
    let filter = TopicFilter::new(["home/debug", "sys/#"]);
    assert!(!filter.allows("home/debug"));
    assert!(filter.allows("home/debug/extra"));
    assert!(filter.allows("Home/Debug"));
    assert!(filter.allows("sys/uptime"));
  }

  #[test]
  fn empty_filter_allows_everything() {
    assert!(TopicFilter::default().allows("anything"));
  }
}
