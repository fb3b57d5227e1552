//! Read-only preview: compute phases plus a membership scan
//!
//! Runs P1–P2 and P4–P5 and counts members of schema-matched groups. The
//! LMS is never written: no apply phase runs and no category is created.

use super::SyncEngine;
use crate::delta::{GroupDelta, UserDelta};
use serde::Serialize;
use sync_common::{SyncResult, SyncStats};

/// Member counts per schema-matched group
#[derive(Debug, Clone, Serialize)]
pub struct GroupMembershipPreview {
    pub group_name: String,
    pub course_idnumber: String,
    pub member_count: usize,
}

/// What a preview returns: the same delta shapes a real run uses
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub users: UserDelta,
    pub groups: GroupDelta,
    pub memberships: Vec<GroupMembershipPreview>,
    pub warnings: Vec<String>,
    pub stats: SyncStats,
}

impl SyncEngine {
    /// Compute everything a run would do without writing to the LMS
    pub async fn preview(&mut self) -> SyncResult<PreviewReport> {
        self.fetch_users().await?;
        self.compute_user_delta().await?;
        self.fetch_groups().await?;
        self.compute_group_delta().await?;

        let page_size = self.config.page_size;
        let matched = std::mem::take(&mut self.matched);
        let mut memberships = Vec::new();

        for entry in &matched {
            let mut count = 0;
            let mut first = 0;
            loop {
                let page = self
                    .deps
                    .idp
                    .list_group_members(&entry.group.id, first, page_size)
                    .await?;
                let fetched = page.len();
                count += fetched;
                first += fetched;
                if fetched < page_size {
                    break;
                }
            }
            memberships.push(GroupMembershipPreview {
                group_name: entry.group.name.clone(),
                course_idnumber: entry.schema_match.course_idnumber.clone(),
                member_count: count,
            });
        }

        self.matched = matched;
        Ok(PreviewReport {
            users: self.user_delta.clone(),
            groups: self.group_delta.clone(),
            memberships,
            warnings: self.warnings.clone(),
            stats: self.stats,
        })
    }
}
