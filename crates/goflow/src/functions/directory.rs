//! Workflows mirroring identity-provider users and organizations into the
//! application directory.

use std::sync::Arc;

use serde::Deserialize;

use goflow_core::domain::{Directory, MembershipRecord, UserRecord, WorkspaceRecord, WorkspaceUpdate};
use goflow_core::error::{Result, StepError};
use goflow_core::workflow::{EventType, StepContext, WorkflowDefinition};

#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEmailAddress {
    pub email_address: String,
}

/// `data` of a `clerk/user.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ClerkUser {
    pub fn to_record(&self) -> UserRecord {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        UserRecord {
            id: self.id.clone(),
            email: self
                .email_addresses
                .first()
                .map(|e| e.email_address.clone()),
            name,
            image: self.image_url.clone(),
        }
    }
}

/// Payload of a deletion event; only the ID is reliable.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkDeleted {
    pub id: String,
}

/// `data` of a `clerk/organization.created` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkOrganization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_by: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// `data` of a `clerk/organization.updated` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkOrganizationUpdate {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// `data` of a `clerk/organizationInvitation.accepted` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkInvitation {
    pub user_id: String,
    pub organization_id: String,
    pub role_name: String,
}

pub fn sync_user(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("sync-user-from-clerk", EventType::UserCreated)
        // Safe to re-run: the insert ignores an existing id.
        .step("create-user", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let user: ClerkUser = ctx.payload_as()?;
                let created = directory.create_user(user.to_record()).await?;
                if !created {
                    tracing::info!(user_id = %user.id, "User already exists, skipping");
                }
                Ok::<_, StepError>(created)
            }
        })
        .validate_with::<ClerkUser>()
        .build()
}

pub fn update_user(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("update-user-from-clerk", EventType::UserUpdated)
        // Safe to re-run: writes the same values again.
        .step("update-user", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let user: ClerkUser = ctx.payload_as()?;
                if !directory.update_user(user.to_record()).await? {
                    return Err(StepError::terminal(format!("user {} not found", user.id)));
                }
                Ok::<_, StepError>(true)
            }
        })
        .validate_with::<ClerkUser>()
        .build()
}

pub fn delete_user(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("delete-user-with-clerk", EventType::UserDeleted)
        // Safe to re-run: a missing user is skipped.
        .step("delete-user", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let user: ClerkDeleted = ctx.payload_as()?;
                let deleted = directory.delete_user(user.id.clone()).await?;
                if !deleted {
                    tracing::info!(user_id = %user.id, "User not found in database, skipping deletion");
                }
                Ok::<_, StepError>(deleted)
            }
        })
        .validate_with::<ClerkDeleted>()
        .build()
}

pub fn sync_workspace(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    let owner_directory = directory.clone();
    WorkflowDefinition::builder("sync-workspace-from-clerk", EventType::OrganizationCreated)
        // Safe to re-run: the insert ignores an existing id.
        .step("create-workspace", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let org: ClerkOrganization = ctx.payload_as()?;
                let created = directory
                    .create_workspace(WorkspaceRecord {
                        id: org.id,
                        name: org.name,
                        slug: org.slug,
                        owner_id: org.created_by,
                        image_url: org.image_url,
                    })
                    .await?;
                Ok::<_, StepError>(created)
            }
        })
        // Safe to re-run: the insert ignores an existing membership.
        .step("add-owner-as-admin", move |ctx: StepContext| {
            let directory = owner_directory.clone();
            async move {
                let org: ClerkOrganization = ctx.payload_as()?;
                let added = directory
                    .add_member(MembershipRecord {
                        user_id: org.created_by,
                        workspace_id: org.id,
                        role: "ADMIN".to_string(),
                    })
                    .await?;
                Ok::<_, StepError>(added)
            }
        })
        .validate_with::<ClerkOrganization>()
        .build()
}

pub fn update_workspace(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("update-workspace-from-clerk", EventType::OrganizationUpdated)
        // Safe to re-run: writes the same values again.
        .step("update-workspace", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let org: ClerkOrganizationUpdate = ctx.payload_as()?;
                let id = org.id.clone();
                let updated = directory
                    .update_workspace(WorkspaceUpdate {
                        id: org.id,
                        name: org.name,
                        slug: org.slug,
                        image_url: org.image_url,
                    })
                    .await?;
                if !updated {
                    return Err(StepError::terminal(format!("workspace {} not found", id)));
                }
                Ok::<_, StepError>(true)
            }
        })
        .validate_with::<ClerkOrganizationUpdate>()
        .build()
}

pub fn delete_workspace(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("delete-workspace-with-clerk", EventType::OrganizationDeleted)
        // Not idempotent: a re-run after a crash finds the workspace gone and fails the run.
        .step("delete-workspace", move |ctx: StepContext| {
            let directory = directory.clone();
            async move {
                let org: ClerkDeleted = ctx.payload_as()?;
                if !directory.delete_workspace(org.id.clone()).await? {
                    return Err(StepError::terminal(format!("workspace {} not found", org.id)));
                }
                Ok::<_, StepError>(true)
            }
        })
        .validate_with::<ClerkDeleted>()
        .build()
}

pub fn sync_workspace_member(directory: Arc<dyn Directory>) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder(
        "sync-workspace-member-from-clerk",
        EventType::InvitationAccepted,
    )
    // Safe to re-run: the insert ignores an existing membership.
    .step("add-member", move |ctx: StepContext| {
        let directory = directory.clone();
        async move {
            let invitation: ClerkInvitation = ctx.payload_as()?;
            let added = directory
                .add_member(MembershipRecord {
                    user_id: invitation.user_id,
                    workspace_id: invitation.organization_id,
                    role: invitation.role_name.to_uppercase(),
                })
                .await?;
            Ok::<_, StepError>(added)
        }
    })
    .validate_with::<ClerkInvitation>()
    .build()
}
