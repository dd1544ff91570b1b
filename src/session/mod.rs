use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;
use log::{error, trace};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use uuid::Uuid;

use crate::shared::schema::sessions;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Resolves login tokens to session rows. Keeps a small in-memory cache in
/// front of the sessions table; expired rows are purged lazily on lookup.
pub struct SessionManager {
    conn: PooledConnection<ConnectionManager<PgConnection>>,
    cache: HashMap<String, Session>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("conn", &"PooledConnection<PgConnection>")
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl SessionManager {
    pub fn new(conn: PooledConnection<ConnectionManager<PgConnection>>) -> Self {
        SessionManager {
            conn,
            cache: HashMap::new(),
        }
    }

    pub fn create_session(
        &mut self,
        uid: Uuid,
        lifetime_hours: i64,
    ) -> Result<Session, Box<dyn Error + Send + Sync>> {
        use crate::shared::schema::sessions::dsl::*;
        let now = Utc::now();
        let inserted: Session = diesel::insert_into(sessions)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(uid),
                token.eq(generate_token()),
                created_at.eq(now),
                expires_at.eq(now + Duration::hours(lifetime_hours)),
            ))
            .returning(Session::as_returning())
            .get_result(&mut self.conn)
            .map_err(|e| {
                error!("Failed to create session in database: {}", e);
                e
            })?;
        self.cache.insert(inserted.token.clone(), inserted.clone());
        Ok(inserted)
    }

    /// Look a token up, returning None for unknown or expired tokens.
    /// An expired row is deleted on the way out.
    pub fn resolve_token(
        &mut self,
        token_value: &str,
    ) -> Result<Option<Session>, Box<dyn Error + Send + Sync>> {
        if let Some(cached) = self.cache.get(token_value) {
            if cached.is_expired() {
                self.delete_session(token_value)?;
                return Ok(None);
            }
            return Ok(Some(cached.clone()));
        }

        use crate::shared::schema::sessions::dsl::*;
        let found: Option<Session> = sessions
            .filter(token.eq(token_value))
            .first::<Session>(&mut self.conn)
            .optional()?;

        match found {
            Some(session) if session.is_expired() => {
                trace!("Purging expired session {}", session.id);
                self.delete_session(token_value)?;
                Ok(None)
            }
            Some(session) => {
                self.cache.insert(token_value.to_string(), session.clone());
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub fn delete_session(
        &mut self,
        token_value: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        use crate::shared::schema::sessions::dsl::*;
        self.cache.remove(token_value);
        diesel::delete(sessions.filter(token.eq(token_value))).execute(&mut self.conn)?;
        Ok(())
    }

    /// Drop every session belonging to a user, e.g. on deactivation.
    pub fn delete_user_sessions(
        &mut self,
        uid: Uuid,
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        use crate::shared::schema::sessions::dsl::*;
        self.cache.retain(|_, s| s.user_id != uid);
        let deleted = diesel::delete(sessions.filter(user_id.eq(uid))).execute(&mut self.conn)?;
        Ok(deleted)
    }

    pub fn purge_expired(&mut self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        use crate::shared::schema::sessions::dsl::*;
        let now = Utc::now();
        self.cache.retain(|_, s| !s.is_expired());
        let deleted =
            diesel::delete(sessions.filter(expires_at.lt(now))).execute(&mut self.conn)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn session_expiry_uses_expires_at() {
        let now = Utc::now();
        let live = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: generate_token(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        let stale = Session {
            expires_at: now - Duration::seconds(5),
            ..live.clone()
        };
        assert!(!live.is_expired());
        assert!(stale.is_expired());
    }
}
