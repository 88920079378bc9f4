//! The history policy: whether a write produces a history record.

/// Decide whether to append a history record for a row write.
///
/// `old_value` is `None` on the first write for a topic. The flags are the
/// ones currently persisted on the row (defaults for a new row).
pub fn should_record(
  old_value: Option<&[u8]>,
  new_value: &[u8],
  history_enable: bool,
  history_diffonly: bool,
) -> bool {
  if !history_enable {
    return false;
  }
  match old_value {
    None => true,
    Some(old) => !history_diffonly || old != new_value,
  }
}
