//! Tenant context threading and validation.
//!
//! Every row the engine reads or writes is attributed to an
//! `(app_id, organization_id)` pair. The context is an immutable value with
//! no lifecycle of its own; it is threaded through every builder and
//! transaction call and validated once at the first use.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The `(app_id, organization_id, [user_id])` triple scoping a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Application the rows belong to.
    pub app_id: String,
    /// Organization owning the application.
    pub organization_id: String,
    /// Optional acting principal, recorded on audit columns where present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TenantContext {
    pub fn new(app_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            organization_id: organization_id.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Rejects contexts with blank identifier fields.
    ///
    /// A present-but-empty `user_id` is also rejected; an absent one is
    /// fine.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(Error::TenantContextInvalid("app_id is blank".into()));
        }
        if self.organization_id.trim().is_empty() {
            return Err(Error::TenantContextInvalid("organization_id is blank".into()));
        }
        if let Some(user_id) = &self.user_id {
            if user_id.trim().is_empty() {
                return Err(Error::TenantContextInvalid("user_id is blank".into()));
            }
        }
        Ok(())
    }
}
