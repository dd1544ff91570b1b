diesel::table! {
    sessions (id) {
        id -> Uuid,
        user_id -> Uuid,
        token -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}
