//! Disk free-space probe backed by sysinfo

use outpost_core::{DiskProbe, OutpostError, Result};
use std::path::Path;
use sysinfo::Disks;

pub struct SysinfoDiskProbe;

impl SysinfoDiskProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SysinfoDiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskProbe for SysinfoDiskProbe {
    /// Free bytes on the disk whose mount point contains `path`. The disk
    /// with the longest matching mount point wins (deepest mount).
    fn free_bytes(&self, path: &Path) -> Result<u64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .ok_or_else(|| OutpostError::FilesystemIO {
                path: path.display().to_string(),
                error: "no disk found for path".to_string(),
            })
    }
}
