//! Blocklist service and release-group auto-blocking
//!
//! Failed grabs land here: the release title is blocked, the group's
//! failure counter bumps, and once the counter crosses the threshold the
//! whole group is blocked (exactly once).

use crate::models::{BlocklistEntry, MediaKind};
use crate::repositories::BlocklistRepository;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Default number of failures before a release group is auto-blocked.
pub const DEFAULT_AUTO_BLOCK_AFTER: i32 = 3;

pub struct BlocklistService<R: BlocklistRepository + ?Sized> {
    repository: Arc<R>,
    auto_block_after: i32,
}

impl<R: BlocklistRepository + ?Sized> BlocklistService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            auto_block_after: DEFAULT_AUTO_BLOCK_AFTER,
        }
    }

    pub fn with_auto_block_after(mut self, threshold: i32) -> Self {
        self.auto_block_after = threshold;
        self
    }

    /// Whether a release (by title or group) is currently blocked.
    pub async fn is_blocked(&self, release_title: &str, release_group: Option<&str>) -> Result<bool> {
        if self.repository.contains_title(release_title).await? {
            return Ok(true);
        }
        if let Some(group) = release_group {
            if self.repository.contains_group(group).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Record a failed acquisition: block the title, count the group
    /// failure, and block the group once the threshold is crossed.
    pub async fn record_failure(
        &self,
        release_title: &str,
        release_group: Option<&str>,
        media: Option<(Uuid, MediaKind)>,
        reason: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut entry = BlocklistEntry::for_release(
            release_title,
            release_group.map(|g| g.to_string()),
            reason,
        );
        if let Some((media_id, kind)) = media {
            entry = entry.with_media(media_id, kind);
        }
        if let Some(err) = error_message {
            entry = entry.with_error(err);
        }
        self.repository.add(&entry).await?;

        info!(release = release_title, reason, "release blocklisted");

        if let Some(group) = release_group {
            let failure = self.repository.bump_group_failures(group).await?;
            if failure.failures >= self.auto_block_after
                && !self.repository.contains_group(group).await?
            {
                warn!(
                    group,
                    failures = failure.failures,
                    "release group crossed failure threshold, blocking group"
                );
                self.repository
                    .add(&BlocklistEntry::for_group(
                        group,
                        format!("auto-blocked after {} failures", failure.failures),
                    ))
                    .await?;
            }
        }
        Ok(())
    }
}
