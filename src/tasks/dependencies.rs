use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::{DependencyType, HistoryAction, TaskStatus};
use crate::shared::schema::task_dependencies;
use crate::shared::state::AppState;
use crate::tasks::history;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_dependencies)]
pub struct TaskDependency {
    pub id: Uuid,
    pub predecessor_id: Uuid,
    pub successor_id: Uuid,
    pub dependency_type: String,
    pub lag_hours: f64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Edge annotated with the other endpoint's title and status, so the board
/// can render it without another round trip.
#[derive(Debug, Serialize)]
pub struct DependencyResponse {
    pub id: Uuid,
    pub predecessor_id: Uuid,
    pub successor_id: Uuid,
    pub dependency_type: String,
    pub lag_hours: f64,
    pub other_task_id: Uuid,
    pub other_task_title: String,
    pub other_task_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DependencyGraphResponse {
    pub predecessors: Vec<DependencyResponse>,
    pub successors: Vec<DependencyResponse>,
}

#[derive(Debug, Deserialize)]
pub struct AddDependencyRequest {
    pub predecessor_id: Uuid,
    pub dependency_type: Option<String>,
    pub lag_hours: Option<f64>,
}

/// True when adding predecessor -> successor would close a loop, i.e. the
/// predecessor is already reachable from the successor over existing edges.
pub fn creates_cycle(edges: &[(Uuid, Uuid)], predecessor: Uuid, successor: Uuid) -> bool {
    if predecessor == successor {
        return true;
    }
    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(*from).or_default().push(*to);
    }

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut stack = vec![successor];
    while let Some(node) = stack.pop() {
        if node == predecessor {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

/// Incomplete finish_to_start predecessors of a task. A non-empty result
/// blocks the task's completion.
pub fn blocking_predecessors(
    conn: &mut PgConnection,
    task: Uuid,
) -> Result<Vec<(Uuid, String)>, diesel::result::Error> {
    use crate::shared::schema::task_dependencies::dsl as deps_dsl;
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    let edges: Vec<TaskDependency> = deps_dsl::task_dependencies
        .filter(deps_dsl::successor_id.eq(task))
        .load(conn)?;

    let gating: Vec<Uuid> = edges
        .iter()
        .filter(|edge| {
            edge.dependency_type
                .parse::<DependencyType>()
                .map(|t| t.blocks_completion())
                .unwrap_or(false)
        })
        .map(|edge| edge.predecessor_id)
        .collect();
    if gating.is_empty() {
        return Ok(Vec::new());
    }

    tasks_dsl::tasks
        .filter(tasks_dsl::id.eq_any(&gating))
        .filter(tasks_dsl::status.ne(TaskStatus::Completed.to_string()))
        .select((tasks_dsl::id, tasks_dsl::title))
        .load(conn)
}

fn load_edge_pairs(conn: &mut PgConnection) -> Result<Vec<(Uuid, Uuid)>, diesel::result::Error> {
    use crate::shared::schema::task_dependencies::dsl::*;
    task_dependencies
        .select((predecessor_id, successor_id))
        .load(conn)
}

fn task_title_status(
    conn: &mut PgConnection,
    task: Uuid,
) -> Result<Option<(String, String)>, diesel::result::Error> {
    use crate::shared::schema::tasks::dsl::*;
    tasks
        .filter(id.eq(task))
        .select((title, status))
        .first::<(String, String)>(conn)
        .optional()
}

pub async fn add_dependency(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<AddDependencyRequest>,
) -> Result<Json<DependencyResponse>, (StatusCode, String)> {
    use crate::shared::schema::task_dependencies::dsl as deps_dsl;

    if req.predecessor_id == task_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "A task cannot depend on itself".to_string(),
        ));
    }

    let dependency_type = match &req.dependency_type {
        Some(t) => t
            .parse::<DependencyType>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => DependencyType::default(),
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let successor = task_title_status(&mut conn, task_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if successor.is_none() {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }
    let predecessor = task_title_status(&mut conn, req.predecessor_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let Some((predecessor_title, predecessor_status)) = predecessor else {
        return Err((
            StatusCode::NOT_FOUND,
            "Predecessor task not found".to_string(),
        ));
    };

    let duplicate: i64 = deps_dsl::task_dependencies
        .filter(deps_dsl::predecessor_id.eq(req.predecessor_id))
        .filter(deps_dsl::successor_id.eq(task_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if duplicate > 0 {
        return Err((
            StatusCode::CONFLICT,
            "This dependency already exists".to_string(),
        ));
    }

    let edges = load_edge_pairs(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if creates_cycle(&edges, req.predecessor_id, task_id) {
        return Err((
            StatusCode::CONFLICT,
            format!(
                "Cannot add dependency: {} already depends on this task",
                predecessor_title
            ),
        ));
    }

    let edge = TaskDependency {
        id: Uuid::new_v4(),
        predecessor_id: req.predecessor_id,
        successor_id: task_id,
        dependency_type: dependency_type.to_string(),
        lag_hours: req.lag_hours.unwrap_or(0.0),
        created_by: auth.user.id,
        created_at: Utc::now(),
    };
    diesel::insert_into(task_dependencies::table)
        .values(&edge)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    history::record(
        &mut conn,
        task_id,
        auth.user.id,
        HistoryAction::DependencyAdded,
        Some("predecessor"),
        None,
        Some(predecessor_title.clone()),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    info!(
        "Added dependency {} -> {} ({})",
        edge.predecessor_id, edge.successor_id, edge.dependency_type
    );
    Ok(Json(DependencyResponse {
        id: edge.id,
        predecessor_id: edge.predecessor_id,
        successor_id: edge.successor_id,
        dependency_type: edge.dependency_type,
        lag_hours: edge.lag_hours,
        other_task_id: req.predecessor_id,
        other_task_title: predecessor_title,
        other_task_status: predecessor_status,
        created_at: edge.created_at,
    }))
}

pub async fn list_dependencies(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<DependencyGraphResponse>, (StatusCode, String)> {
    use crate::shared::schema::task_dependencies::dsl as deps_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if task_title_status(&mut conn, task_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let incoming: Vec<TaskDependency> = deps_dsl::task_dependencies
        .filter(deps_dsl::successor_id.eq(task_id))
        .order(deps_dsl::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let outgoing: Vec<TaskDependency> = deps_dsl::task_dependencies
        .filter(deps_dsl::predecessor_id.eq(task_id))
        .order(deps_dsl::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut predecessors = Vec::with_capacity(incoming.len());
    for edge in incoming {
        let other = edge.predecessor_id;
        predecessors.push(annotate(&mut conn, edge, other)?);
    }
    let mut successors = Vec::with_capacity(outgoing.len());
    for edge in outgoing {
        let other = edge.successor_id;
        successors.push(annotate(&mut conn, edge, other)?);
    }

    Ok(Json(DependencyGraphResponse {
        predecessors,
        successors,
    }))
}

fn annotate(
    conn: &mut PgConnection,
    edge: TaskDependency,
    other: Uuid,
) -> Result<DependencyResponse, (StatusCode, String)> {
    let (other_title, other_status) = task_title_status(conn, other)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .unwrap_or_else(|| ("(deleted)".to_string(), String::new()));
    Ok(DependencyResponse {
        id: edge.id,
        predecessor_id: edge.predecessor_id,
        successor_id: edge.successor_id,
        dependency_type: edge.dependency_type,
        lag_hours: edge.lag_hours,
        other_task_id: other,
        other_task_title: other_title,
        other_task_status: other_status,
        created_at: edge.created_at,
    })
}

pub async fn remove_dependency(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path((task_id, dependency_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::task_dependencies::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let deleted = diesel::delete(
        task_dependencies
            .filter(id.eq(dependency_id))
            .filter(successor_id.eq(task_id).or(predecessor_id.eq(task_id))),
    )
    .execute(&mut conn)
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;
    if deleted == 0 {
        return Err((StatusCode::NOT_FOUND, "Dependency not found".to_string()));
    }

    info!("Removed dependency {}", dependency_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_blocking(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<serde_json::Value>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if task_title_status(&mut conn, task_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let blockers = blocking_predecessors(&mut conn, task_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(
        blockers
            .into_iter()
            .map(|(blocker_id, title)| serde_json::json!({ "id": blocker_id, "title": title }))
            .collect(),
    ))
}

pub fn configure_dependencies_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tasks/:id/dependencies",
            get(list_dependencies).post(add_dependency),
        )
        .route(
            "/api/tasks/:id/dependencies/:dep_id",
            delete(remove_dependency),
        )
        .route("/api/tasks/:id/blocking", get(list_blocking))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn direct_back_edge_is_a_cycle() {
        let t = ids(2);
        let edges = vec![(t[0], t[1])];
        assert!(creates_cycle(&edges, t[1], t[0]));
    }

    #[test]
    fn transitive_back_edge_is_a_cycle() {
        let t = ids(4);
        let edges = vec![(t[0], t[1]), (t[1], t[2]), (t[2], t[3])];
        assert!(creates_cycle(&edges, t[3], t[0]));
    }

    #[test]
    fn parallel_chains_are_fine() {
        let t = ids(4);
        let edges = vec![(t[0], t[1]), (t[2], t[3])];
        assert!(!creates_cycle(&edges, t[1], t[2]));
        assert!(!creates_cycle(&edges, t[0], t[3]));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let t = ids(4);
        // t0 fans out to t1 and t2, both feed t3.
        let edges = vec![(t[0], t[1]), (t[0], t[2]), (t[1], t[3])];
        assert!(!creates_cycle(&edges, t[2], t[3]));
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let t = ids(1);
        assert!(creates_cycle(&[], t[0], t[0]));
    }

    #[test]
    fn empty_graph_accepts_any_edge() {
        let t = ids(2);
        assert!(!creates_cycle(&[], t[0], t[1]));
    }
}
