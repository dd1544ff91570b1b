//! First-run seeding: administrator account and optional demo data.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use log::info;
use uuid::Uuid;

use crate::directory::users::User;
use crate::directory::Team;
use crate::projects::Project;
use crate::security::AccountPasswordHasher;
use crate::shared::enums::{
    DependencyType, HistoryAction, ProjectStatus, TaskComplexity, TaskPriority, TaskStatus,
    UserRole,
};
use crate::shared::schema::{projects, task_comments, task_dependencies, tasks, teams, time_logs, users};
use crate::shared::state::AppState;
use crate::tasks::comments::TaskComment;
use crate::tasks::dependencies::TaskDependency;
use crate::tasks::history;
use crate::tasks::time_logs::TimeLog;
use crate::tasks::Task;

const ADMIN_USERNAME: &str = "admin";

/// Seeds the very first administrator account, and the demo dataset when
/// configured. Runs at startup and is a no-op once any account exists.
pub fn run_seed(state: &AppState) -> Result<()> {
    let mut conn = state.conn.get()?;
    let hasher = state
        .extensions
        .get::<AccountPasswordHasher>()
        .ok_or_else(|| anyhow!("password hasher not configured"))?;

    let existing: i64 = users::table.count().get_result(&mut conn)?;
    if existing > 0 {
        info!("Accounts already present, skipping bootstrap seed");
        return Ok(());
    }

    let (admin_password, seed_demo) = state
        .config
        .as_ref()
        .map(|c| (c.admin_password.clone(), c.seed_demo_data))
        .unwrap_or_else(|| ("admin123".to_string(), false));

    let admin_hash = hasher.hash(&admin_password)?;
    let admin = insert_user(
        &mut conn,
        &admin_hash,
        ADMIN_USERNAME,
        "admin@localhost",
        "Administrator",
        UserRole::Director,
        true,
        None,
    )?;
    info!("Created administrator account '{}'", ADMIN_USERNAME);

    if seed_demo {
        seed_demo_data(&mut conn, hasher, admin)?;
        info!("Demo dataset seeded");
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_user(
    conn: &mut PgConnection,
    password_hash: &str,
    username: &str,
    email: &str,
    display_name: &str,
    role: UserRole,
    is_administrator: bool,
    team_id: Option<Uuid>,
) -> Result<Uuid> {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        password_hash: password_hash.to_string(),
        role: role.to_string(),
        is_administrator,
        is_active: true,
        team_id,
        created_at: Utc::now(),
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)?;
    Ok(user.id)
}

fn base_task(creator: Uuid, title: &str, created_days_ago: i64) -> Task {
    let created = Utc::now() - Duration::days(created_days_ago);
    Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        status: TaskStatus::Todo.to_string(),
        priority: TaskPriority::Medium.to_string(),
        complexity: TaskComplexity::Medium.to_string(),
        estimated_hours: None,
        actual_hours: 0.0,
        created_by: creator,
        assignee_id: None,
        supervisor_id: None,
        team_id: None,
        project_id: None,
        parent_task_id: None,
        tags: vec![],
        started_at: None,
        due_date: None,
        completed_at: None,
        created_at: created,
        updated_at: created,
    }
}

fn insert_task(conn: &mut PgConnection, task: &Task) -> Result<Uuid> {
    diesel::insert_into(tasks::table)
        .values(task)
        .execute(conn)?;
    history::record(
        conn,
        task.id,
        task.created_by,
        HistoryAction::Created,
        None,
        None,
        Some(task.title.clone()),
    )?;
    Ok(task.id)
}

/// Records the status trail a task walked through, one entry per hop.
fn record_status_path(
    conn: &mut PgConnection,
    task: Uuid,
    actor: Uuid,
    path: &[TaskStatus],
) -> Result<()> {
    for pair in path.windows(2) {
        history::record(
            conn,
            task,
            actor,
            HistoryAction::StatusChanged,
            Some("status"),
            Some(pair[0].to_string()),
            Some(pair[1].to_string()),
        )?;
    }
    Ok(())
}

fn insert_dependency(
    conn: &mut PgConnection,
    predecessor: Uuid,
    successor: Uuid,
    created_by: Uuid,
) -> Result<()> {
    let edge = TaskDependency {
        id: Uuid::new_v4(),
        predecessor_id: predecessor,
        successor_id: successor,
        dependency_type: DependencyType::FinishToStart.to_string(),
        lag_hours: 0.0,
        created_by,
        created_at: Utc::now(),
    };
    diesel::insert_into(task_dependencies::table)
        .values(&edge)
        .execute(conn)?;
    Ok(())
}

fn insert_comment(
    conn: &mut PgConnection,
    task: Uuid,
    author: Uuid,
    content: &str,
    days_ago: i64,
) -> Result<()> {
    let at = Utc::now() - Duration::days(days_ago);
    let comment = TaskComment {
        id: Uuid::new_v4(),
        task_id: task,
        user_id: author,
        content: content.to_string(),
        created_at: at,
        updated_at: at,
    };
    diesel::insert_into(task_comments::table)
        .values(&comment)
        .execute(conn)?;
    Ok(())
}

fn insert_closed_log(
    conn: &mut PgConnection,
    task: Uuid,
    user: Uuid,
    start: DateTime<Utc>,
    hours: f64,
    note: &str,
) -> Result<()> {
    let log = TimeLog {
        id: Uuid::new_v4(),
        task_id: task,
        user_id: user,
        start_time: start,
        end_time: Some(start + Duration::minutes((hours * 60.0) as i64)),
        duration_hours: Some(hours),
        description: Some(note.to_string()),
        created_at: start,
    };
    diesel::insert_into(time_logs::table)
        .values(&log)
        .execute(conn)?;
    Ok(())
}

fn seed_demo_data(
    conn: &mut PgConnection,
    hasher: &AccountPasswordHasher,
    admin: Uuid,
) -> Result<()> {
    let now = Utc::now();

    let team = Team {
        id: Uuid::new_v4(),
        name: "Platform".to_string(),
        description: Some("Everything behind the customer portal".to_string()),
        is_active: true,
        created_at: now - Duration::days(30),
    };
    diesel::insert_into(teams::table)
        .values(&team)
        .execute(conn)?;

    // Demo accounts share one password hash.
    let demo_hash = hasher.hash("Demo1234")?;
    let morgan = insert_user(
        conn,
        &demo_hash,
        "morgan",
        "morgan@example.com",
        "Morgan Reyes",
        UserRole::Manager,
        false,
        Some(team.id),
    )?;
    let alex = insert_user(
        conn,
        &demo_hash,
        "alex",
        "alex@example.com",
        "Alex Kim",
        UserRole::Analyst,
        false,
        Some(team.id),
    )?;
    let riley = insert_user(
        conn,
        &demo_hash,
        "riley",
        "riley@example.com",
        "Riley Chen",
        UserRole::Analyst,
        false,
        Some(team.id),
    )?;

    let portal = Project {
        id: Uuid::new_v4(),
        name: "Customer Portal".to_string(),
        description: Some("Self-service portal for account management".to_string()),
        status: ProjectStatus::Active.to_string(),
        team_id: Some(team.id),
        created_by: morgan,
        due_date: Some(now + Duration::days(30)),
        created_at: now - Duration::days(28),
    };
    diesel::insert_into(projects::table)
        .values(&portal)
        .execute(conn)?;

    let mut onboarding = base_task(morgan, "Design the onboarding flow", 20);
    onboarding.status = TaskStatus::Completed.to_string();
    onboarding.priority = TaskPriority::High.to_string();
    onboarding.assignee_id = Some(alex);
    onboarding.team_id = Some(team.id);
    onboarding.project_id = Some(portal.id);
    onboarding.estimated_hours = Some(10.0);
    onboarding.actual_hours = 12.0;
    onboarding.started_at = Some(now - Duration::days(18));
    onboarding.completed_at = Some(now - Duration::days(12));
    insert_task(conn, &onboarding)?;
    record_status_path(
        conn,
        onboarding.id,
        alex,
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Completed,
        ],
    )?;
    insert_closed_log(
        conn,
        onboarding.id,
        alex,
        now - Duration::days(15),
        12.0,
        "Wireframes and review rounds",
    )?;

    let mut signup_api = base_task(morgan, "Implement signup API", 14);
    signup_api.status = TaskStatus::InProgress.to_string();
    signup_api.priority = TaskPriority::Urgent.to_string();
    signup_api.assignee_id = Some(alex);
    signup_api.supervisor_id = Some(morgan);
    signup_api.team_id = Some(team.id);
    signup_api.project_id = Some(portal.id);
    signup_api.estimated_hours = Some(16.0);
    signup_api.actual_hours = 5.5;
    signup_api.tags = vec!["backend".to_string()];
    signup_api.started_at = Some(now - Duration::days(4));
    signup_api.due_date = Some(now + Duration::days(5));
    insert_task(conn, &signup_api)?;
    record_status_path(
        conn,
        signup_api.id,
        alex,
        &[TaskStatus::Todo, TaskStatus::InProgress],
    )?;
    insert_closed_log(
        conn,
        signup_api.id,
        alex,
        now - Duration::days(2),
        5.5,
        "Endpoint scaffolding and validation",
    )?;
    insert_comment(
        conn,
        signup_api.id,
        morgan,
        "How long do the verification tokens stay valid?",
        2,
    )?;
    insert_comment(
        conn,
        signup_api.id,
        alex,
        "24 hours, then the signup has to restart.",
        1,
    )?;

    let mut verification = base_task(morgan, "Build email verification", 14);
    verification.priority = TaskPriority::High.to_string();
    verification.assignee_id = Some(riley);
    verification.team_id = Some(team.id);
    verification.project_id = Some(portal.id);
    verification.estimated_hours = Some(8.0);
    insert_task(conn, &verification)?;
    insert_dependency(conn, signup_api.id, verification.id, morgan)?;

    let mut staging = base_task(riley, "Set up staging environment", 25);
    staging.status = TaskStatus::Completed.to_string();
    staging.assignee_id = Some(riley);
    staging.team_id = Some(team.id);
    staging.actual_hours = 6.0;
    staging.started_at = Some(now - Duration::days(24));
    staging.completed_at = Some(now - Duration::days(21));
    insert_task(conn, &staging)?;
    record_status_path(
        conn,
        staging.id,
        riley,
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Completed,
        ],
    )?;
    insert_closed_log(
        conn,
        staging.id,
        riley,
        now - Duration::days(23),
        6.0,
        "Provisioning and smoke checks",
    )?;

    let mut load_tests = base_task(morgan, "Write load tests", 10);
    load_tests.team_id = Some(team.id);
    load_tests.project_id = Some(portal.id);
    load_tests.tags = vec!["qa".to_string()];
    load_tests.due_date = Some(now + Duration::days(7));
    insert_task(conn, &load_tests)?;
    insert_dependency(conn, staging.id, load_tests.id, morgan)?;

    let mut dashboard = base_task(morgan, "Portal dashboard", 12);
    dashboard.status = TaskStatus::InProgress.to_string();
    dashboard.priority = TaskPriority::High.to_string();
    dashboard.assignee_id = Some(alex);
    dashboard.team_id = Some(team.id);
    dashboard.project_id = Some(portal.id);
    dashboard.started_at = Some(now - Duration::days(8));
    insert_task(conn, &dashboard)?;
    record_status_path(
        conn,
        dashboard.id,
        alex,
        &[TaskStatus::Todo, TaskStatus::InProgress],
    )?;

    let mut charts = base_task(alex, "Dashboard charts", 8);
    charts.parent_task_id = Some(dashboard.id);
    charts.team_id = Some(team.id);
    charts.project_id = Some(portal.id);
    insert_task(conn, &charts)?;

    let mut filters = base_task(alex, "Dashboard filters", 8);
    filters.status = TaskStatus::Completed.to_string();
    filters.parent_task_id = Some(dashboard.id);
    filters.assignee_id = Some(alex);
    filters.team_id = Some(team.id);
    filters.project_id = Some(portal.id);
    filters.actual_hours = 4.0;
    filters.completed_at = Some(now - Duration::days(2));
    insert_task(conn, &filters)?;
    record_status_path(
        conn,
        filters.id,
        alex,
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Completed,
        ],
    )?;

    let mut policy = base_task(morgan, "Update privacy policy", 6);
    policy.status = TaskStatus::InReview.to_string();
    policy.priority = TaskPriority::Low.to_string();
    policy.assignee_id = Some(riley);
    policy.supervisor_id = Some(morgan);
    policy.team_id = Some(team.id);
    policy.started_at = Some(now - Duration::days(5));
    insert_task(conn, &policy)?;
    record_status_path(
        conn,
        policy.id,
        riley,
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
        ],
    )?;

    let mut rate_limit = base_task(admin, "Fix login rate limiting", 9);
    rate_limit.priority = TaskPriority::Urgent.to_string();
    rate_limit.team_id = Some(team.id);
    rate_limit.tags = vec!["security".to_string()];
    rate_limit.due_date = Some(now - Duration::days(2));
    insert_task(conn, &rate_limit)?;

    Ok(())
}
