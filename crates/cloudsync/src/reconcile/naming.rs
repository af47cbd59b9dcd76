//! Collision-free names for new and renamed records.

use super::ReconcileError;
use crate::store::RecordStore;

const MAX_SUFFIX: u32 = 1000;

/// Turns a remote name into a usable local base name.
pub fn sanitize(hint: &str, kind: &str) -> String {
    let trimmed: String = hint
        .trim()
        .chars()
        .map(|c| if c.is_control() { '-' } else { c })
        .collect();
    if trimmed.is_empty() {
        kind.trim_end_matches('s').to_string()
    } else {
        trimmed
    }
}

/// Returns `hint` if no other record of `kind` uses it, else the first free
/// `hint-N`. A record's own name counts as free for that record.
///
/// The caller holds the kind's name lock so the answer stays valid until
/// the record is written.
pub async fn generate_name(
    store: &RecordStore,
    kind: &'static str,
    hint: &str,
    own_id: Option<&str>,
) -> Result<String, ReconcileError> {
    let base = sanitize(hint, kind);
    if !store.name_exists(kind, &base, own_id).await? {
        return Ok(base);
    }
    for n in 1..=MAX_SUFFIX {
        let candidate = format!("{}-{}", base, n);
        if !store.name_exists(kind, &candidate, own_id).await? {
            return Ok(candidate);
        }
    }
    Err(ReconcileError::NameExhausted { kind, hint: base })
}
