//! Browser-scope helpers.
//!
//! Thin typed wrappers over root-scope `Target` and `Browser` commands.

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::Result;
use crate::identifiers::TargetId;
use crate::protocol::{
    BrowserCommand, BrowserVersion, CreateTargetResult, GetTargetsResult, TargetCommand,
    TargetInfo,
};

use super::core::Connection;

// ============================================================================
// Connection - Browser Helpers
// ============================================================================

impl Connection {
    /// Lists the browser's targets.
    ///
    /// # Errors
    ///
    /// Returns any command or connection error.
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let result: GetTargetsResult = self.call(TargetCommand::GetTargets {}).await?;
        Ok(result.target_infos)
    }

    /// Opens a new page target at `url`.
    ///
    /// # Errors
    ///
    /// Returns any command or connection error.
    pub async fn create_target(&self, url: impl Into<String>) -> Result<TargetId> {
        let result: CreateTargetResult = self
            .call(TargetCommand::CreateTarget { url: url.into() })
            .await?;
        debug!(target_id = %result.target_id, "Target created");
        Ok(result.target_id)
    }

    /// Closes a target.
    ///
    /// # Errors
    ///
    /// Returns any command or connection error.
    pub async fn close_target(&self, target_id: TargetId) -> Result<()> {
        self.execute(TargetCommand::CloseTarget { target_id }).await?;
        Ok(())
    }

    /// Turns `Target.targetCreated` / `Target.targetDestroyed` events on or off.
    ///
    /// # Errors
    ///
    /// Returns any command or connection error.
    pub async fn set_discover_targets(&self, discover: bool) -> Result<()> {
        self.execute(TargetCommand::SetDiscoverTargets { discover })
            .await?;
        Ok(())
    }

    /// Returns browser version information.
    ///
    /// # Errors
    ///
    /// Returns any command or connection error.
    pub async fn version(&self) -> Result<BrowserVersion> {
        self.call(BrowserCommand::GetVersion {}).await
    }
}

// ============================================================================
// Tests
// ============================================================================
