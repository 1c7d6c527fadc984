use tracing::info;

use crate::canvas::CanvasManager;
use crate::domain::{Project, now_millis};
use crate::error::CanvasResult;

/// Display name given to the Inbox when it is first created.
pub const INBOX_NAME: &str = "Inbox";

impl CanvasManager {
    /// Returns the Inbox, creating it first if the store has none.
    ///
    /// Safe to call on every startup: when an Inbox already exists nothing is
    /// written. Creation goes through the store's compare-and-create, so two
    /// first-time callers still end up with a single Inbox.
    pub async fn ensure_inbox_exists(&self) -> CanvasResult<Project> {
        if let Some(inbox) = self.repo.find_inbox().await? {
            return Ok(inbox);
        }

        let (inbox, created) = self
            .repo
            .create_inbox_if_absent(INBOX_NAME, now_millis())
            .await?;
        if created {
            info!(project_id = %inbox.id, "created inbox project");
        }

        Ok(inbox)
    }
}
