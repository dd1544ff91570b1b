use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::HistoryAction;
use crate::shared::schema::task_history;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_history)]
pub struct TaskHistoryEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub action: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Appends one history row. Called by the task, comment, attachment,
/// dependency, and time handlers; there is no write endpoint.
pub fn record(
    conn: &mut PgConnection,
    task: Uuid,
    actor: Uuid,
    action: HistoryAction,
    field: Option<&str>,
    old_value: Option<String>,
    new_value: Option<String>,
) -> Result<(), diesel::result::Error> {
    let entry = TaskHistoryEntry {
        id: Uuid::new_v4(),
        task_id: task,
        user_id: actor,
        action: action.to_string(),
        field_name: field.map(str::to_string),
        old_value,
        new_value,
        created_at: Utc::now(),
    };
    diesel::insert_into(task_history::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Query(query): Query<HistoryListQuery>,
) -> Result<Json<Vec<HistoryResponse>>, (StatusCode, String)> {
    use crate::shared::schema::task_history::dsl as history_dsl;
    use crate::shared::schema::tasks::dsl as tasks_dsl;
    use crate::shared::schema::users::dsl as users_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::id.eq(task_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let entries: Vec<TaskHistoryEntry> = history_dsl::task_history
        .filter(history_dsl::task_id.eq(task_id))
        .order(history_dsl::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let actor_ids: Vec<Uuid> = entries.iter().map(|e| e.user_id).collect();
    let names: HashMap<Uuid, String> = users_dsl::users
        .filter(users_dsl::id.eq_any(&actor_ids))
        .select((users_dsl::id, users_dsl::username))
        .load::<(Uuid, String)>(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .into_iter()
        .collect();

    let responses = entries
        .into_iter()
        .map(|entry| HistoryResponse {
            id: entry.id,
            task_id: entry.task_id,
            user_id: entry.user_id,
            username: names
                .get(&entry.user_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            action: entry.action,
            field_name: entry.field_name,
            old_value: entry.old_value,
            new_value: entry.new_value,
            created_at: entry.created_at,
        })
        .collect();

    Ok(Json(responses))
}

pub fn configure_history_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/tasks/:id/history", get(list_history))
}
