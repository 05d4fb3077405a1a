use sqlx::PgPool;

use goflow_core::domain::{
    Directory, MembershipRecord, UserRecord, WorkspaceRecord, WorkspaceUpdate,
};
use goflow_core::error::Result;
use goflow_core::workflow::BoxFuture;

/// Writes users, workspaces and memberships.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Directory for PgDirectory {
    fn create_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO users (id, email, name, image)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.image)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn update_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET email = $2, name = $3, image = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.image)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn delete_user(&self, user_id: String) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(&user_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn create_workspace(&self, workspace: WorkspaceRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO workspaces (id, name, slug, owner_id, image_url)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&workspace.id)
            .bind(&workspace.name)
            .bind(&workspace.slug)
            .bind(&workspace.owner_id)
            .bind(&workspace.image_url)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn update_workspace(&self, update: WorkspaceUpdate) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE workspaces
                SET name = $2, slug = $3, image_url = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(&update.id)
            .bind(&update.name)
            .bind(&update.slug)
            .bind(&update.image_url)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn delete_workspace(&self, workspace_id: String) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
                .bind(&workspace_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn add_member(&self, member: MembershipRecord) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO workspace_members (user_id, workspace_id, role)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, workspace_id) DO NOTHING
                "#,
            )
            .bind(&member.user_id)
            .bind(&member.workspace_id)
            .bind(&member.role)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }
}
