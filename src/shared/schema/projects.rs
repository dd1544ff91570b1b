diesel::table! {
    projects (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        team_id -> Nullable<Uuid>,
        created_by -> Uuid,
        due_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}
