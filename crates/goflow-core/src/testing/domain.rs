use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::lock;
use crate::domain::{
    Directory, MembershipRecord, TaskDetails, TaskStatus, TaskStore, UserRecord, WorkspaceRecord,
    WorkspaceUpdate,
};
use crate::error::{GoflowError, Result};
use crate::workflow::BoxFuture;

/// In-memory task table.
#[derive(Default)]
pub struct MemoryTasks {
    tasks: Mutex<HashMap<String, TaskDetails>>,
    reads: AtomicUsize,
}

impl MemoryTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: TaskDetails) {
        lock(&self.tasks).insert(task.id.clone(), task);
    }

    pub fn set_status(&self, task_id: &str, status: TaskStatus) {
        if let Some(task) = lock(&self.tasks).get_mut(task_id) {
            task.status = status;
        }
    }

    pub fn remove(&self, task_id: &str) {
        lock(&self.tasks).remove(task_id);
    }

    /// Number of `find_task` calls served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TaskStore for MemoryTasks {
    fn find_task(&self, task_id: String) -> BoxFuture<'_, Result<Option<TaskDetails>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(lock(&self.tasks).get(&task_id).cloned())
        })
    }
}

/// In-memory user and workspace directory.
#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, UserRecord>>,
    workspaces: Mutex<HashMap<String, WorkspaceRecord>>,
    members: Mutex<Vec<MembershipRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        lock(&self.users).get(id).cloned()
    }

    pub fn workspace(&self, id: &str) -> Option<WorkspaceRecord> {
        lock(&self.workspaces).get(id).cloned()
    }

    pub fn members(&self, workspace_id: &str) -> Vec<MembershipRecord> {
        lock(&self.members)
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect()
    }
}

impl Directory for MemoryDirectory {
    fn create_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut users = lock(&self.users);
            if users.contains_key(&user.id) {
                return Ok(false);
            }
            users.insert(user.id.clone(), user);
            Ok(true)
        })
    }

    fn update_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut users = lock(&self.users);
            match users.get_mut(&user.id) {
                Some(existing) => {
                    *existing = user;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete_user(&self, user_id: String) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let removed = lock(&self.users).remove(&user_id).is_some();
            if removed {
                lock(&self.members).retain(|m| m.user_id != user_id);
            }
            Ok(removed)
        })
    }

    fn create_workspace(&self, workspace: WorkspaceRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut workspaces = lock(&self.workspaces);
            if workspaces.contains_key(&workspace.id) {
                return Ok(false);
            }
            workspaces.insert(workspace.id.clone(), workspace);
            Ok(true)
        })
    }

    fn update_workspace(&self, update: WorkspaceUpdate) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut workspaces = lock(&self.workspaces);
            match workspaces.get_mut(&update.id) {
                Some(existing) => {
                    existing.name = update.name;
                    existing.slug = update.slug;
                    existing.image_url = update.image_url;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete_workspace(&self, workspace_id: String) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let removed = lock(&self.workspaces).remove(&workspace_id).is_some();
            if removed {
                lock(&self.members).retain(|m| m.workspace_id != workspace_id);
            }
            Ok(removed)
        })
    }

    fn add_member(&self, member: MembershipRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if !lock(&self.workspaces).contains_key(&member.workspace_id) {
                return Err(GoflowError::NotFound(format!(
                    "workspace {}",
                    member.workspace_id
                )));
            }
            let mut members = lock(&self.members);
            if members
                .iter()
                .any(|m| m.user_id == member.user_id && m.workspace_id == member.workspace_id)
            {
                return Ok(false);
            }
            members.push(member);
            Ok(true)
        })
    }
}
