use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::projects::{progress_percent, StatusCounts};
use crate::shared::enums::{ProjectStatus, TaskStatus, UserRole};
use crate::shared::schema::{projects, tasks, time_logs, users};
use crate::shared::state::AppState;

pub mod ui;

pub use ui::configure_dashboard_ui_routes;

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct PriorityCounts {
    pub urgent: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl PriorityCounts {
    pub fn from_rows(rows: Vec<(String, i64)>) -> Self {
        let mut counts = PriorityCounts::default();
        for (priority, n) in rows {
            match priority.as_str() {
                "urgent" => counts.urgent = n,
                "high" => counts.high = n,
                "medium" => counts.medium = n,
                "low" => counts.low = n,
                _ => {}
            }
        }
        counts
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_tasks: i64,
    pub task_counts: StatusCounts,
    pub completion_rate: f64,
    pub overdue_count: i64,
    pub active_projects: i64,
    pub total_logged_hours: f64,
    pub open_by_priority: PriorityCounts,
}

#[derive(Debug, Serialize)]
pub struct UserReportRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub assigned_total: i64,
    pub assigned_completed: i64,
    pub completion_rate: f64,
    pub logged_hours: f64,
}

#[derive(Debug, Serialize)]
pub struct OverdueTaskRow {
    pub id: Uuid,
    pub title: String,
    pub priority: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: Option<String>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
) -> Result<Json<DashboardSummary>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let status_rows: Vec<(String, i64)> = tasks::table
        .group_by(tasks::status)
        .select((tasks::status, diesel::dsl::count_star()))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let task_counts = StatusCounts::from_rows(status_rows);
    let total_tasks = task_counts.total();

    let overdue_count: i64 = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .filter(tasks::due_date.lt(Utc::now()))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let active_projects: i64 = projects::table
        .filter(projects::status.eq(ProjectStatus::Active.to_string()))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let total_logged_hours: Option<f64> = tasks::table
        .select(diesel::dsl::sum(tasks::actual_hours))
        .first(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let priority_rows: Vec<(String, i64)> = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .group_by(tasks::priority)
        .select((tasks::priority, diesel::dsl::count_star()))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(DashboardSummary {
        total_tasks,
        completion_rate: progress_percent(total_tasks, task_counts.completed),
        overdue_count,
        active_projects,
        total_logged_hours: round1(total_logged_hours.unwrap_or(0.0)),
        open_by_priority: PriorityCounts::from_rows(priority_rows),
        task_counts,
    }))
}

pub async fn user_report(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<Json<Vec<UserReportRow>>, (StatusCode, String)> {
    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let members: Vec<(Uuid, String, String, String)> = users::table
        .filter(users::is_active.eq(true))
        .select((users::id, users::username, users::display_name, users::role))
        .order(users::username.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut report = Vec::with_capacity(members.len());
    for (user_id, username, display_name, role) in members {
        let assigned_total: i64 = tasks::table
            .filter(tasks::assignee_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        let assigned_completed: i64 = tasks::table
            .filter(tasks::assignee_id.eq(user_id))
            .filter(tasks::status.eq(TaskStatus::Completed.to_string()))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        let logged: Option<f64> = time_logs::table
            .filter(time_logs::user_id.eq(user_id))
            .select(diesel::dsl::sum(time_logs::duration_hours))
            .first(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

        report.push(UserReportRow {
            user_id,
            username,
            display_name,
            role,
            assigned_total,
            assigned_completed,
            completion_rate: progress_percent(assigned_total, assigned_completed),
            logged_hours: round1(logged.unwrap_or(0.0)),
        });
    }

    Ok(Json(report))
}

pub async fn list_overdue(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
) -> Result<Json<Vec<OverdueTaskRow>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<(Uuid, String, String, String, Option<DateTime<Utc>>, Option<Uuid>)> =
        tasks::table
            .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
            .filter(tasks::due_date.lt(Utc::now()))
            .select((
                tasks::id,
                tasks::title,
                tasks::priority,
                tasks::status,
                tasks::due_date,
                tasks::assignee_id,
            ))
            .order(tasks::due_date.asc())
            .limit(50)
            .load(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let assignee_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.5).collect();
    let names: HashMap<Uuid, String> = users::table
        .filter(users::id.eq_any(&assignee_ids))
        .select((users::id, users::username))
        .load::<(Uuid, String)>(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .into_iter()
        .collect();

    Ok(Json(
        rows.into_iter()
            .map(|(id, title, priority, status, due_date, assignee_id)| OverdueTaskRow {
                id,
                title,
                priority,
                status,
                due_date,
                assignee: assignee_id.and_then(|a| names.get(&a).cloned()),
            })
            .collect(),
    ))
}

pub fn configure_dashboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dashboard/summary", get(get_summary))
        .route("/api/dashboard/user-report", get(user_report))
        .route("/api/dashboard/overdue", get(list_overdue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rows_fold_into_counts() {
        let counts = PriorityCounts::from_rows(vec![
            ("urgent".to_string(), 2),
            ("medium".to_string(), 7),
            ("mystery".to_string(), 9),
        ]);
        assert_eq!(
            counts,
            PriorityCounts {
                urgent: 2,
                high: 0,
                medium: 7,
                low: 0,
            }
        );
    }

    #[test]
    fn rounding_keeps_one_decimal() {
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round1(7.25), 7.3);
        assert_eq!(round1(0.0), 0.0);
    }
}
