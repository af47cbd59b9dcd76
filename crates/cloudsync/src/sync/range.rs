use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What one sync covers. The default is a plain full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRange {
    /// Also walk VM peripherals of existing VMs and re-read every storage
    /// cache.
    #[serde(default)]
    pub deep_sync: bool,

    /// Only create and delete; common pairs are left as they are.
    #[serde(default)]
    pub xor: bool,

    /// Local region ids to sync. Empty means all.
    #[serde(default)]
    pub region_ids: BTreeSet<String>,

    /// Local zone ids to descend into. Empty means all.
    #[serde(default)]
    pub zone_ids: BTreeSet<String>,

    /// Local host ids to descend into. Empty means all.
    #[serde(default)]
    pub host_ids: BTreeSet<String>,

    /// Resource keywords not to sync at all.
    #[serde(default)]
    pub skip_resources: BTreeSet<String>,
}

impl SyncRange {
    pub fn deep() -> Self {
        Self {
            deep_sync: true,
            ..Default::default()
        }
    }

    pub fn is_not_skip(&self, keyword: &str) -> bool {
        !self.skip_resources.contains(keyword)
    }

    pub fn needs_region(&self, region_id: &str) -> bool {
        self.region_ids.is_empty() || self.region_ids.contains(region_id)
    }

    pub fn needs_zone(&self, zone_id: &str) -> bool {
        self.zone_ids.is_empty() || self.zone_ids.contains(zone_id)
    }

    pub fn needs_host(&self, host_id: &str) -> bool {
        self.host_ids.is_empty() || self.host_ids.contains(host_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_covers_everything() {
        let range = SyncRange::default();
        assert!(range.is_not_skip("hosts"));
        assert!(range.needs_region("r1"));
        assert!(range.needs_zone("z1"));
        assert!(range.needs_host("h1"));
        assert!(!range.deep_sync);
    }

    #[test]
    fn test_filters() {
        let range: SyncRange = serde_json::from_str(
            r#"{"zone_ids": ["z1"], "skip_resources": ["snapshots"], "xor": true}"#,
        )
        .unwrap();
        assert!(range.needs_zone("z1"));
        assert!(!range.needs_zone("z2"));
        assert!(!range.is_not_skip("snapshots"));
        assert!(range.is_not_skip("disks"));
        assert!(range.xor);
    }
}
