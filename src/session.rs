//! Server-side login sessions keyed by an opaque cookie.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "certificados_session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Admin,
    /// A holder who passed the national ID + code check.
    Holder { national_id: String },
}

/// Sessions older than `ttl` are treated as absent and pruned on the next login.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, (Session, Instant)>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Stores `session` and returns its token.
    pub fn create(&self, session: Session) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, (_, created)| created.elapsed() < self.ttl);
        sessions.insert(token.clone(), (session, Instant::now()));
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .filter(|(_, created)| created.elapsed() < self.ttl)
            .map(|(session, _)| session.clone())
    }

    pub fn remove(&self, token: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Session attached to the request, with its token.
    pub fn current(&self, headers: &HeaderMap) -> Option<(String, Session)> {
        let token = session_token(headers)?;
        let session = self.get(&token)?;
        Some((token, session))
    }

    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        matches!(self.current(headers), Some((_, Session::Admin)))
    }
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

pub fn expired_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        SESSION_COOKIE
    )
}
