diesel::table! {
    teams (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        display_name -> Varchar,
        password_hash -> Text,
        role -> Varchar,
        is_administrator -> Bool,
        is_active -> Bool,
        team_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}
