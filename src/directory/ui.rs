use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use diesel::prelude::*;
use std::sync::Arc;

use crate::directory::Team;
use crate::shared::schema::{tasks, teams, users};
use crate::shared::state::AppState;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn configure_directory_ui_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/ui/teams", get(handle_team_list))
}

async fn handle_team_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Ok(mut conn) = state.conn.get() else {
        return Html("<p>Unable to load teams</p>".to_string());
    };

    let rows: Vec<Team> = teams::table
        .filter(teams::is_active.eq(true))
        .order(teams::name.asc())
        .load(&mut conn)
        .unwrap_or_default();

    if rows.is_empty() {
        return Html(
            "<div class=\"empty-state\">\
                <div class=\"empty-icon\">👥</div>\
                <h3>No teams yet</h3>\
                <p>Create a team to group your members</p>\
            </div>"
                .to_string(),
        );
    }

    let hash = "#";
    let mut html = String::from("<ul class=\"team-list\">");
    for team in &rows {
        let members: i64 = users::table
            .filter(users::team_id.eq(team.id))
            .count()
            .get_result(&mut conn)
            .unwrap_or(0);
        let open_tasks: i64 = tasks::table
            .filter(tasks::team_id.eq(team.id))
            .filter(tasks::status.ne("completed"))
            .count()
            .get_result(&mut conn)
            .unwrap_or(0);

        html.push_str(&format!(
            "<li class=\"team-item\">\
                <a href=\"{hash}\" hx-get=\"/api/ui/tasks/board?team_id={id}\" hx-target=\"{hash}board\" hx-swap=\"innerHTML\">{name}</a>\
                <span class=\"team-counts\">{members} members &middot; {open} open</span>\
            </li>",
            hash = hash,
            id = team.id,
            name = html_escape(&team.name),
            members = members,
            open = open_tasks,
        ));
    }
    html.push_str("</ul>");

    Html(html)
}
