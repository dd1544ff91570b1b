use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::{HistoryAction, UserRole};
use crate::shared::schema::task_comments;
use crate::shared::state::AppState;
use crate::tasks::history;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_comments)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

fn author_names(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, (String, String)>, diesel::result::Error> {
    use crate::shared::schema::users::dsl::*;
    Ok(users
        .filter(id.eq_any(ids))
        .select((id, username, display_name))
        .load::<(Uuid, String, String)>(conn)?
        .into_iter()
        .map(|(user, name, display)| (user, (name, display)))
        .collect())
}

fn into_response(comment: TaskComment, names: &HashMap<Uuid, (String, String)>) -> CommentResponse {
    let (username, display_name) = names
        .get(&comment.user_id)
        .cloned()
        .unwrap_or_else(|| ("unknown".to_string(), "Unknown".to_string()));
    CommentResponse {
        id: comment.id,
        task_id: comment.task_id,
        user_id: comment.user_id,
        username,
        display_name,
        content: comment.content,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    }
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    if req.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Comment content cannot be empty".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::id.eq(task))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let now = Utc::now();
    let comment = TaskComment {
        id: Uuid::new_v4(),
        task_id: task,
        user_id: auth.user.id,
        content: req.content.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(task_comments::table)
        .values(&comment)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    history::record(
        &mut conn,
        task,
        auth.user.id,
        HistoryAction::Commented,
        None,
        None,
        None,
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    let names = HashMap::from([(
        auth.user.id,
        (auth.user.username.clone(), auth.user.display_name.clone()),
    )]);
    Ok(Json(into_response(comment, &names)))
}

/// Comments for one task, oldest first, with author names resolved.
pub fn comments_for_task(
    conn: &mut PgConnection,
    task: Uuid,
) -> Result<Vec<CommentResponse>, diesel::result::Error> {
    use crate::shared::schema::task_comments::dsl::*;

    let comments: Vec<TaskComment> = task_comments
        .filter(task_id.eq(task))
        .order(created_at.asc())
        .load(conn)?;

    let author_ids: Vec<Uuid> = comments.iter().map(|c| c.user_id).collect();
    let names = author_names(conn, &author_ids)?;

    Ok(comments
        .into_iter()
        .map(|c| into_response(c, &names))
        .collect())
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
) -> Result<Json<Vec<CommentResponse>>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::id.eq(task))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let rows = comments_for_task(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(comment_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, (StatusCode, String)> {
    use crate::shared::schema::task_comments::dsl::*;

    if req.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Comment content cannot be empty".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let comment: TaskComment = task_comments
        .filter(id.eq(comment_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Comment not found".to_string()))?;

    if comment.user_id != auth.user.id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the author can edit a comment".to_string(),
        ));
    }

    let now = Utc::now();
    diesel::update(task_comments.filter(id.eq(comment_id)))
        .set((content.eq(req.content.trim()), updated_at.eq(now)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    let names = HashMap::from([(
        auth.user.id,
        (auth.user.username.clone(), auth.user.display_name.clone()),
    )]);
    let updated = TaskComment {
        content: req.content.trim().to_string(),
        updated_at: now,
        ..comment
    };
    Ok(Json(into_response(updated, &names)))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::task_comments::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let comment: TaskComment = task_comments
        .filter(id.eq(comment_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Comment not found".to_string()))?;

    if comment.user_id != auth.user.id && !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the author or a manager can delete a comment".to_string(),
        ));
    }

    diesel::delete(task_comments.filter(id.eq(comment_id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    info!("Deleted comment {} on task {}", comment_id, comment.task_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_comments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tasks/:id/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/comments/:id",
            put(update_comment).delete(delete_comment),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_author_degrades_gracefully() {
        let comment = TaskComment {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content: "ship it".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let response = into_response(comment, &HashMap::new());
        assert_eq!(response.username, "unknown");
        assert_eq!(response.content, "ship it");
    }
}
