use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::TaskStatus;
use crate::shared::schema::{task_attachments, task_dependencies, tasks, time_logs, users};
use crate::shared::state::AppState;
use crate::tasks::attachments::{human_size, TaskAttachment};
use crate::tasks::time_logs::TimeLog;
use crate::tasks::{comments, workflow, Task};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub project_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn priority_badge(priority: &str) -> &'static str {
    match priority {
        "urgent" => "<span class=\"badge badge-danger\">Urgent</span>",
        "high" => "<span class=\"badge badge-warning\">High</span>",
        "medium" => "<span class=\"badge badge-info\">Medium</span>",
        "low" => "<span class=\"badge badge-secondary\">Low</span>",
        _ => "<span class=\"badge\">Unknown</span>",
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "todo" => "<span class=\"badge badge-secondary\">To Do</span>",
        "in_progress" => "<span class=\"badge badge-primary\">In Progress</span>",
        "in_review" => "<span class=\"badge badge-warning\">In Review</span>",
        "completed" => "<span class=\"badge badge-success\">Completed</span>",
        _ => "<span class=\"badge\">Unknown</span>",
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "To Do",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::InReview => "In Review",
        TaskStatus::Completed => "Completed",
    }
}

fn render_empty_state(icon: &str, title: &str, description: &str) -> String {
    format!(
        "<div class=\"empty-state\">\
            <div class=\"empty-icon\">{}</div>\
            <h3>{}</h3>\
            <p>{}</p>\
        </div>",
        icon, title, description
    )
}

fn render_task_card(task: &Task) -> String {
    let overdue_badge = if task.is_overdue(chrono::Utc::now()) {
        "<span class=\"badge badge-danger\">Overdue</span>"
    } else {
        ""
    };

    let assignee = task.assignee_id.map(|_| "Assigned").unwrap_or("Unassigned");

    let due = task
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut tags_html = String::new();
    for tag in &task.tags {
        tags_html.push_str(&format!(
            "<span class=\"tag-chip\">{}</span>",
            html_escape(tag)
        ));
    }

    let hash = "#";

    format!(
        "<div class=\"task-card\" data-id=\"{id}\" data-status=\"{raw_status}\">\
            <div class=\"task-card-header\">\
                {priority}\
                {overdue}\
            </div>\
            <div class=\"task-card-body\">\
                <a href=\"{hash}\" hx-get=\"/api/ui/tasks/{id}\" hx-target=\"{hash}task-detail\" hx-swap=\"innerHTML\">{title}</a>\
                <div class=\"task-tags\">{tags}</div>\
            </div>\
            <div class=\"task-card-footer\">\
                <span class=\"task-assignee\">{assignee}</span>\
                <span class=\"task-due\">{due}</span>\
                <span class=\"task-hours\">{hours:.1}h</span>\
            </div>\
        </div>",
        id = task.id,
        raw_status = task.status,
        hash = hash,
        priority = priority_badge(&task.priority),
        overdue = overdue_badge,
        title = html_escape(&task.title),
        tags = tags_html,
        assignee = assignee,
        due = due,
        hours = task.actual_hours,
    )
}

fn render_task_row(task: &Task) -> String {
    let assignee = task.assignee_id.map(|_| "Assigned").unwrap_or("Unassigned");
    let due = task
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let hash = "#";

    format!(
        "<tr class=\"task-row\" data-id=\"{id}\">\
            <td class=\"task-title\">\
                <a href=\"{hash}\" hx-get=\"/api/ui/tasks/{id}\" hx-target=\"{hash}task-detail\" hx-swap=\"innerHTML\">{title}</a>\
            </td>\
            <td class=\"task-status\">{status}</td>\
            <td class=\"task-priority\">{priority}</td>\
            <td class=\"task-assignee\">{assignee}</td>\
            <td class=\"task-due\">{due}</td>\
            <td class=\"task-hours\">{hours:.1}h</td>\
            <td class=\"task-actions\">\
                <button class=\"btn-icon\" hx-delete=\"/api/tasks/{id}\" hx-confirm=\"Delete this task?\" hx-swap=\"none\" title=\"Delete\">×</button>\
            </td>\
        </tr>",
        id = task.id,
        hash = hash,
        title = html_escape(&task.title),
        status = status_badge(&task.status),
        priority = priority_badge(&task.priority),
        assignee = assignee,
        due = due,
        hours = task.actual_hours,
    )
}

fn render_board_column(status: TaskStatus, column_tasks: &[Task]) -> String {
    let mut cards = String::new();
    for task in column_tasks {
        cards.push_str(&render_task_card(task));
    }
    if cards.is_empty() {
        cards = "<p class=\"column-empty\">Nothing here</p>".to_string();
    }

    format!(
        "<div class=\"board-column\" data-status=\"{raw}\">\
            <div class=\"board-column-header\">\
                <h3>{label}</h3>\
                <span class=\"board-count\">{count}</span>\
            </div>\
            <div class=\"board-cards\">{cards}</div>\
        </div>",
        raw = status,
        label = status_label(status),
        count = column_tasks.len(),
        cards = cards,
    )
}

pub fn configure_tasks_ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ui/tasks", get(handle_tasks_list))
        .route("/api/ui/tasks/board", get(handle_board))
        .route("/api/ui/tasks/search", get(handle_tasks_search))
        .route("/api/ui/tasks/count", get(handle_tasks_count))
        .route("/api/ui/tasks/open-count", get(handle_open_count))
        .route("/api/ui/tasks/overdue-count", get(handle_overdue_count))
        .route("/api/ui/tasks/my-count", get(handle_my_count))
        .route("/api/ui/tasks/mine", get(handle_my_tasks))
        .route("/api/ui/tasks/:id", get(handle_task_detail))
}

async fn handle_tasks_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html(render_empty_state("📋", "No tasks", "Unable to load tasks"));
    };

    let mut q = tasks::table.into_boxed();
    if let Some(status) = query.status {
        if status != "all" {
            q = q.filter(tasks::status.eq(status));
        }
    }

    let rows: Vec<Task> = q
        .order(tasks::created_at.desc())
        .limit(50)
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html(render_empty_state(
            "📋",
            "No tasks yet",
            "Create your first task to get started",
        ));
    }

    let mut html = String::from(
        "<table class=\"tasks-table\">\
            <thead>\
                <tr>\
                    <th>Title</th>\
                    <th>Status</th>\
                    <th>Priority</th>\
                    <th>Assignee</th>\
                    <th>Due</th>\
                    <th>Logged</th>\
                    <th>Actions</th>\
                </tr>\
            </thead>\
            <tbody>",
    );

    for task in &rows {
        html.push_str(&render_task_row(task));
    }

    html.push_str("</tbody></table>");
    Html(html)
}

async fn handle_board(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BoardQuery>,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html(render_empty_state("📋", "Board unavailable", "Unable to load tasks"));
    };

    let mut html = String::from("<div class=\"kanban-board\">");

    for status in [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::Completed,
    ] {
        let mut q = tasks::table
            .filter(tasks::status.eq(status.to_string()))
            .into_boxed();
        if let Some(project) = query.project_id {
            q = q.filter(tasks::project_id.eq(project));
        }
        if let Some(team) = query.team_id {
            q = q.filter(tasks::team_id.eq(team));
        }
        if let Some(assignee) = query.assignee_id {
            q = q.filter(tasks::assignee_id.eq(assignee));
        }

        let column: Vec<Task> = q
            .order(tasks::created_at.desc())
            .limit(50)
            .load(&mut conn)
            .unwrap_or_default();

        html.push_str(&render_board_column(status, &column));
    }

    html.push_str("</div>");
    Html(html)
}

async fn handle_tasks_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html(render_empty_state("🔍", "Search error", "Unable to search tasks"));
    };

    let search_term = query.q.unwrap_or_default();
    if search_term.is_empty() {
        return Html(render_empty_state(
            "🔍",
            "Enter search term",
            "Type to search tasks",
        ));
    }

    let pattern = format!("%{search_term}%");

    let rows: Vec<Task> = tasks::table
        .filter(
            tasks::title
                .ilike(pattern.clone())
                .or(tasks::description.ilike(pattern)),
        )
        .order(tasks::created_at.desc())
        .limit(20)
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html(render_empty_state(
            "🔍",
            "No results",
            "No tasks match your search",
        ));
    }

    let mut html = String::from("<div class=\"search-results\">");
    for task in &rows {
        html.push_str(&render_task_card(task));
    }
    html.push_str("</div>");

    Html(html)
}

async fn handle_tasks_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("0".to_string());
    };

    let count: i64 = match query.status {
        Some(status) if status != "all" => tasks::table
            .filter(tasks::status.eq(status))
            .count()
            .get_result(&mut conn)
            .unwrap_or(0),
        _ => tasks::table.count().get_result(&mut conn).unwrap_or(0),
    };

    Html(count.to_string())
}

async fn handle_open_count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("0".to_string());
    };

    let count: i64 = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    Html(count.to_string())
}

async fn handle_overdue_count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("0".to_string());
    };

    let now = chrono::Utc::now();
    let count: i64 = tasks::table
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .filter(tasks::due_date.lt(now))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    Html(count.to_string())
}

async fn handle_my_count(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("0".to_string());
    };

    let count: i64 = tasks::table
        .filter(tasks::assignee_id.eq(auth.user.id))
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    Html(count.to_string())
}

async fn handle_my_tasks(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html(render_empty_state("📋", "No tasks", "Unable to load tasks"));
    };

    let rows: Vec<Task> = tasks::table
        .filter(tasks::assignee_id.eq(auth.user.id))
        .filter(tasks::status.ne(TaskStatus::Completed.to_string()))
        .order(tasks::due_date.asc())
        .limit(20)
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html(render_empty_state(
            "🎉",
            "All clear",
            "Nothing assigned to you right now",
        ));
    }

    let mut html = String::from("<div class=\"my-tasks\">");
    for task in &rows {
        html.push_str(&render_task_card(task));
    }
    html.push_str("</div>");

    Html(html)
}

fn user_names(conn: &mut PgConnection, ids: &[Uuid]) -> HashMap<Uuid, String> {
    users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::display_name))
        .load::<(Uuid, String)>(conn)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

async fn handle_task_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html(render_empty_state("❌", "Error", "Unable to load task"));
    };

    let task: Result<Task, _> = tasks::table.filter(tasks::id.eq(id)).first(&mut conn);
    let Ok(task) = task else {
        return Html(render_empty_state("❌", "Not found", "Task not found"));
    };

    let subtasks: Vec<Task> = tasks::table
        .filter(tasks::parent_task_id.eq(id))
        .order(tasks::created_at.asc())
        .load(&mut conn)
        .unwrap_or_default();

    let task_logs: Vec<TimeLog> = time_logs::table
        .filter(time_logs::task_id.eq(id))
        .order(time_logs::start_time.desc())
        .limit(5)
        .load(&mut conn)
        .unwrap_or_default();

    let attachments_rows: Vec<TaskAttachment> = task_attachments::table
        .filter(task_attachments::task_id.eq(id))
        .order(task_attachments::uploaded_at.desc())
        .load(&mut conn)
        .unwrap_or_default();

    let mut people = vec![task.created_by];
    people.extend(task.assignee_id);
    people.extend(task.supervisor_id);
    people.extend(task_logs.iter().map(|l| l.user_id));
    let names = user_names(&mut conn, &people);
    let creator = names
        .get(&task.created_by)
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let assignee = task
        .assignee_id
        .and_then(|a| names.get(&a).cloned())
        .unwrap_or_else(|| "Unassigned".to_string());

    let predecessor_ids: Vec<Uuid> = task_dependencies::table
        .filter(task_dependencies::successor_id.eq(id))
        .select(task_dependencies::predecessor_id)
        .load(&mut conn)
        .unwrap_or_default();
    let predecessors: Vec<(String, String)> = tasks::table
        .filter(tasks::id.eq_any(&predecessor_ids))
        .select((tasks::title, tasks::status))
        .load(&mut conn)
        .unwrap_or_default();

    let task_comments = comments::comments_for_task(&mut conn, id).unwrap_or_default();

    let description = task
        .description
        .as_deref()
        .unwrap_or("No description provided");
    let due = task
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let estimate = task
        .estimated_hours
        .map(|h| format!("{h:.1}h"))
        .unwrap_or_else(|| "-".to_string());
    let created = task.created_at.format("%Y-%m-%d %H:%M").to_string();

    let mut subtasks_html = String::new();
    for sub in &subtasks {
        subtasks_html.push_str(&format!(
            "<li class=\"subtask\">{} {}</li>",
            status_badge(&sub.status),
            html_escape(&sub.title),
        ));
    }
    if subtasks_html.is_empty() {
        subtasks_html = "<li class=\"subtask-empty\">No subtasks</li>".to_string();
    }

    let mut deps_html = String::new();
    for (dep_title, dep_status) in &predecessors {
        deps_html.push_str(&format!(
            "<li class=\"dependency\">{} {}</li>",
            status_badge(dep_status),
            html_escape(dep_title),
        ));
    }
    if deps_html.is_empty() {
        deps_html = "<li class=\"dependency-empty\">No dependencies</li>".to_string();
    }

    let mut logs_html = String::new();
    for log in &task_logs {
        let who = names
            .get(&log.user_id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        match log.duration_hours {
            Some(hours) => logs_html.push_str(&format!(
                "<li class=\"time-log\">{} logged {:.1}h on {}</li>",
                html_escape(&who),
                hours,
                log.start_time.format("%Y-%m-%d"),
            )),
            None => logs_html.push_str(&format!(
                "<li class=\"time-log running\">{} has a timer running since {}</li>",
                html_escape(&who),
                log.start_time.format("%Y-%m-%d %H:%M"),
            )),
        }
    }
    if logs_html.is_empty() {
        logs_html = "<li class=\"time-log-empty\">No time logged yet</li>".to_string();
    }

    let mut attachments_html = String::new();
    for attachment in &attachments_rows {
        attachments_html.push_str(&format!(
            "<li class=\"attachment\">\
                <a href=\"/api/attachments/{}\">{}</a>\
                <span class=\"attachment-size\">{}</span>\
            </li>",
            attachment.id,
            html_escape(&attachment.original_filename),
            human_size(attachment.file_size),
        ));
    }
    if attachments_html.is_empty() {
        attachments_html = "<li class=\"attachment-empty\">No attachments</li>".to_string();
    }

    let mut comments_html = String::new();
    for comment in &task_comments {
        let comment_time = comment.created_at.format("%Y-%m-%d %H:%M").to_string();
        comments_html.push_str(&format!(
            "<div class=\"comment\">\
                <div class=\"comment-header\">\
                    <span class=\"comment-author\">{}</span>\
                    <span class=\"comment-time\">{}</span>\
                </div>\
                <div class=\"comment-body\">{}</div>\
            </div>",
            html_escape(&comment.display_name),
            comment_time,
            html_escape(&comment.content),
        ));
    }

    let mut actions_html = String::new();
    for target in workflow::allowed_transitions(task.status_enum()) {
        actions_html.push_str(&format!(
            "<button class=\"btn btn-primary\" hx-put=\"/api/tasks/{}/status\" \
             hx-vals='{{\"status\": \"{}\"}}' hx-ext=\"json-enc\" hx-swap=\"none\">{}</button>",
            task.id,
            target,
            status_label(*target),
        ));
    }

    let html = format!(
        "<div class=\"task-detail\">\
            <div class=\"task-detail-header\">\
                <h2>{title}</h2>\
                <div class=\"task-badges\">\
                    {status}\
                    {priority}\
                </div>\
            </div>\
            <div class=\"task-detail-meta\">\
                <div class=\"meta-item\">\
                    <label>Assignee</label>\
                    <span>{assignee}</span>\
                </div>\
                <div class=\"meta-item\">\
                    <label>Created by</label>\
                    <span>{creator}</span>\
                </div>\
                <div class=\"meta-item\">\
                    <label>Due</label>\
                    <span>{due}</span>\
                </div>\
                <div class=\"meta-item\">\
                    <label>Created</label>\
                    <span>{created}</span>\
                </div>\
                <div class=\"meta-item\">\
                    <label>Estimate</label>\
                    <span>{estimate}</span>\
                </div>\
                <div class=\"meta-item\">\
                    <label>Logged</label>\
                    <span>{logged:.1}h</span>\
                </div>\
            </div>\
            <div class=\"task-detail-description\">\
                <h3>Description</h3>\
                <p>{description}</p>\
            </div>\
            <div class=\"task-detail-actions\">\
                {actions}\
                <button class=\"btn btn-secondary\" hx-post=\"/api/tasks/{id}/time/start\" hx-swap=\"none\">Start Timer</button>\
                <button class=\"btn btn-secondary\" hx-post=\"/api/tasks/{id}/time/stop\" hx-swap=\"none\">Stop Timer</button>\
            </div>\
            <div class=\"task-subtasks\">\
                <h3>Subtasks ({subtask_count})</h3>\
                <ul>{subtasks}</ul>\
            </div>\
            <div class=\"task-dependencies\">\
                <h3>Waiting on ({dep_count})</h3>\
                <ul>{deps}</ul>\
            </div>\
            <div class=\"task-time-logs\">\
                <h3>Time logs</h3>\
                <ul>{logs}</ul>\
            </div>\
            <div class=\"task-attachments\">\
                <h3>Attachments ({attachment_count})</h3>\
                <ul>{attachments}</ul>\
            </div>\
            <div class=\"task-comments\">\
                <h3>Comments ({comment_count})</h3>\
                {comments}\
                <form class=\"comment-form\" hx-post=\"/api/tasks/{id}/comments\" hx-ext=\"json-enc\" hx-target=\"#task-detail\" hx-swap=\"innerHTML\">\
                    <textarea name=\"content\" placeholder=\"Add a comment...\" required></textarea>\
                    <button type=\"submit\" class=\"btn btn-primary\">Add Comment</button>\
                </form>\
            </div>\
        </div>",
        id = task.id,
        title = html_escape(&task.title),
        status = status_badge(&task.status),
        priority = priority_badge(&task.priority),
        assignee = html_escape(&assignee),
        creator = html_escape(&creator),
        due = due,
        created = created,
        estimate = estimate,
        logged = task.actual_hours,
        description = html_escape(description),
        actions = actions_html,
        subtask_count = subtasks.len(),
        subtasks = subtasks_html,
        dep_count = predecessors.len(),
        deps = deps_html,
        logs = logs_html,
        attachment_count = attachments_rows.len(),
        attachments = attachments_html,
        comment_count = task_comments.len(),
        comments = comments_html,
    );

    Html(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_html_metacharacters() {
        assert_eq!(
            html_escape("<b>\"fish\" & 'chips'</b>"),
            "&lt;b&gt;&quot;fish&quot; &amp; &#x27;chips&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn badges_map_known_values() {
        assert!(status_badge("in_review").contains("In Review"));
        assert!(priority_badge("urgent").contains("badge-danger"));
        assert!(status_badge("bogus").contains("Unknown"));
    }
}
