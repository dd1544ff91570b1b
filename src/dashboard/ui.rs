use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::projects::{progress_percent, project_task_counts, Project, StatusCounts};
use crate::shared::enums::{ProjectStatus, TaskStatus};
use crate::shared::schema::{projects, tasks, time_logs, users};
use crate::shared::state::AppState;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn configure_dashboard_ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ui/dashboard/stats", get(handle_stats))
        .route("/api/ui/dashboard/priority", get(handle_priority_breakdown))
        .route("/api/ui/dashboard/projects", get(handle_project_progress))
        .route("/api/ui/dashboard/user-report", get(handle_user_report))
        .route("/api/ui/dashboard/overdue", get(handle_overdue_list))
        .route(
            "/api/ui/dashboard/completion-rate",
            get(handle_completion_rate),
        )
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load stats</p>".to_string());
    };

    let rows: Vec<(String, i64)> = tasks::table
        .group_by(tasks::status)
        .select((tasks::status, diesel::dsl::count_star()))
        .load(&mut conn)
        .unwrap_or_default();
    let counts = StatusCounts::from_rows(rows);

    let overdue: i64 = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .filter(tasks::due_date.lt(chrono::Utc::now()))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    let html = format!(
        "<div class=\"stats-grid\">\
            <div class=\"stat-card stat-todo\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">To Do</div>\
            </div>\
            <div class=\"stat-card stat-progress\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">In Progress</div>\
            </div>\
            <div class=\"stat-card stat-review\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">In Review</div>\
            </div>\
            <div class=\"stat-card stat-completed\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">Completed</div>\
            </div>\
            <div class=\"stat-card stat-overdue\">\
                <div class=\"stat-value\">{}</div>\
                <div class=\"stat-label\">Overdue</div>\
            </div>\
        </div>",
        counts.todo, counts.in_progress, counts.in_review, counts.completed, overdue
    );

    Html(html)
}

async fn handle_priority_breakdown(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load stats</p>".to_string());
    };

    let open = tasks::status.ne(TaskStatus::Completed.to_string());

    let urgent: i64 = tasks::table
        .filter(tasks::priority.eq("urgent"))
        .filter(open.clone())
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let high: i64 = tasks::table
        .filter(tasks::priority.eq("high"))
        .filter(open.clone())
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let medium: i64 = tasks::table
        .filter(tasks::priority.eq("medium"))
        .filter(open.clone())
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let low: i64 = tasks::table
        .filter(tasks::priority.eq("low"))
        .filter(open)
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    let html = format!(
        "<div class=\"priority-stats\">\
            <div class=\"priority-bar\">\
                <div class=\"priority-segment urgent\" style=\"flex: {};\" title=\"Urgent: {}\"></div>\
                <div class=\"priority-segment high\" style=\"flex: {};\" title=\"High: {}\"></div>\
                <div class=\"priority-segment medium\" style=\"flex: {};\" title=\"Medium: {}\"></div>\
                <div class=\"priority-segment low\" style=\"flex: {};\" title=\"Low: {}\"></div>\
            </div>\
            <div class=\"priority-legend\">\
                <span class=\"legend-item\"><span class=\"dot urgent\"></span>Urgent ({})</span>\
                <span class=\"legend-item\"><span class=\"dot high\"></span>High ({})</span>\
                <span class=\"legend-item\"><span class=\"dot medium\"></span>Medium ({})</span>\
                <span class=\"legend-item\"><span class=\"dot low\"></span>Low ({})</span>\
            </div>\
        </div>",
        urgent, urgent, high, high, medium, medium, low, low,
        urgent, high, medium, low
    );

    Html(html)
}

async fn handle_project_progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load projects</p>".to_string());
    };

    let rows: Vec<Project> = projects::table
        .filter(projects::status.eq(ProjectStatus::Active.to_string()))
        .order(projects::created_at.desc())
        .limit(10)
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html("<p class=\"no-projects\">No active projects</p>".to_string());
    }

    let mut html = String::from("<div class=\"project-progress-list\">");
    for project in &rows {
        let counts = project_task_counts(&mut conn, project.id).unwrap_or_default();
        let progress = progress_percent(counts.total(), counts.completed);
        html.push_str(&format!(
            "<div class=\"project-progress\" data-id=\"{id}\">\
                <div class=\"project-progress-header\">\
                    <span class=\"project-name\">{name}</span>\
                    <span class=\"project-percent\">{progress:.1}%</span>\
                </div>\
                <div class=\"progress-track\">\
                    <div class=\"progress-fill\" style=\"width: {progress:.1}%;\"></div>\
                </div>\
                <div class=\"project-progress-meta\">{completed} of {total} tasks done</div>\
            </div>",
            id = project.id,
            name = html_escape(&project.name),
            progress = progress,
            completed = counts.completed,
            total = counts.total(),
        ));
    }
    html.push_str("</div>");

    Html(html)
}

async fn handle_user_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load report</p>".to_string());
    };

    let members: Vec<(Uuid, String, String)> = users::table
        .filter(users::is_active.eq(true))
        .select((users::id, users::display_name, users::role))
        .order(users::username.asc())
        .load(&mut conn)
        .unwrap_or_default();

    if members.is_empty() {
        return Html("<p class=\"no-members\">No active members</p>".to_string());
    }

    let mut html = String::from(
        "<table class=\"report-table\">\
            <thead>\
                <tr>\
                    <th>Member</th>\
                    <th>Role</th>\
                    <th>Assigned</th>\
                    <th>Completed</th>\
                    <th>Rate</th>\
                    <th>Logged</th>\
                </tr>\
            </thead>\
            <tbody>",
    );

    for (user_id, display_name, role) in &members {
        let assigned: i64 = tasks::table
            .filter(tasks::assignee_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .unwrap_or(0);
        let completed: i64 = tasks::table
            .filter(tasks::assignee_id.eq(user_id))
            .filter(tasks::status.eq(TaskStatus::Completed.to_string()))
            .count()
            .get_result(&mut conn)
            .unwrap_or(0);
        let logged: Option<f64> = time_logs::table
            .filter(time_logs::user_id.eq(user_id))
            .select(diesel::dsl::sum(time_logs::duration_hours))
            .first(&mut conn)
            .unwrap_or(None);

        html.push_str(&format!(
            "<tr>\
                <td>{}</td>\
                <td>{}</td>\
                <td>{}</td>\
                <td>{}</td>\
                <td>{:.1}%</td>\
                <td>{:.1}h</td>\
            </tr>",
            html_escape(display_name),
            html_escape(role),
            assigned,
            completed,
            progress_percent(assigned, completed),
            logged.unwrap_or(0.0),
        ));
    }

    html.push_str("</tbody></table>");
    Html(html)
}

async fn handle_overdue_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load overdue tasks</p>".to_string());
    };

    let rows: Vec<(Uuid, String, String, Option<chrono::DateTime<chrono::Utc>>)> = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .filter(tasks::due_date.lt(chrono::Utc::now()))
        .select((tasks::id, tasks::title, tasks::priority, tasks::due_date))
        .order(tasks::due_date.asc())
        .limit(20)
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html("<p class=\"no-overdue\">Nothing overdue</p>".to_string());
    }

    let hash = "#";
    let mut html = String::from("<ul class=\"overdue-list\">");
    for (id, title, priority, due_date) in rows {
        let due = due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            "<li class=\"overdue-item priority-{priority}\">\
                <a href=\"{hash}\" hx-get=\"/api/ui/tasks/{id}\" hx-target=\"{hash}task-detail\" hx-swap=\"innerHTML\">{title}</a>\
                <span class=\"overdue-due\">{due}</span>\
            </li>",
            priority = priority,
            hash = hash,
            id = id,
            title = html_escape(&title),
            due = due,
        ));
    }
    html.push_str("</ul>");

    Html(html)
}

async fn handle_completion_rate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("-".to_string());
    };

    let total: i64 = tasks::table.count().get_result(&mut conn).unwrap_or(0);
    let completed: i64 = tasks::table
        .filter(tasks::status.eq(TaskStatus::Completed.to_string()))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    if total == 0 {
        return Html("-".to_string());
    }

    Html(format!("{:.1}%", progress_percent(total, completed)))
}
