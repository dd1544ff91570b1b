diesel::table! {
    tasks (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        complexity -> Varchar,
        estimated_hours -> Nullable<Float8>,
        actual_hours -> Float8,
        created_by -> Uuid,
        assignee_id -> Nullable<Uuid>,
        supervisor_id -> Nullable<Uuid>,
        team_id -> Nullable<Uuid>,
        project_id -> Nullable<Uuid>,
        parent_task_id -> Nullable<Uuid>,
        tags -> Array<Text>,
        started_at -> Nullable<Timestamptz>,
        due_date -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    task_dependencies (id) {
        id -> Uuid,
        predecessor_id -> Uuid,
        successor_id -> Uuid,
        dependency_type -> Varchar,
        lag_hours -> Float8,
        created_by -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    time_logs (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        start_time -> Timestamptz,
        end_time -> Nullable<Timestamptz>,
        duration_hours -> Nullable<Float8>,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    task_comments (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    task_history (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        action -> Varchar,
        field_name -> Nullable<Varchar>,
        old_value -> Nullable<Text>,
        new_value -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    task_attachments (id) {
        id -> Uuid,
        task_id -> Uuid,
        filename -> Varchar,
        original_filename -> Varchar,
        file_size -> Int8,
        file_type -> Varchar,
        uploaded_by -> Uuid,
        uploaded_at -> Timestamptz,
    }
}
