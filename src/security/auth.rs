use chrono::{Duration, NaiveDateTime, Utc};
use rand::RngCore;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::user::User;

const TOKEN_BYTES: usize = 32;

// ── Bearer token guard ──

/// Raw token from `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one("Authorization")
            .and_then(parse_bearer)
        {
            Some(token) => Outcome::Success(BearerToken(token.to_string())),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

// ── Authenticated user guard ──

/// Guard: an active user holding an unexpired session token.
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = match request.guard::<BearerToken>().await {
            Outcome::Success(t) => t.0,
            _ => return Outcome::Forward(Status::Unauthorized),
        };
        let pool = match request.guard::<&State<DbPool>>().await {
            Outcome::Success(p) => p,
            _ => return Outcome::Forward(Status::InternalServerError),
        };
        let conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                log::error!("No database connection for session lookup: {}", e);
                return Outcome::Forward(Status::InternalServerError);
            }
        };

        match session_user(&conn, &token) {
            Ok(Some(user)) => Outcome::Success(AuthenticatedUser { user, token }),
            Ok(None) => Outcome::Forward(Status::Unauthorized),
            Err(e) => {
                log::error!("Session lookup failed: {}", e);
                Outcome::Forward(Status::InternalServerError)
            }
        }
    }
}

// ── Password utilities ──

pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── Session management ──

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Open a session for `user_id`; returns the token to hand to the client and its expiry.
pub fn create_session(
    conn: &Connection,
    user_id: i64,
    expiry_hours: i64,
) -> AppResult<(String, NaiveDateTime)> {
    let token = generate_token();
    let now = Utc::now().naive_utc();
    let expires = now + Duration::hours(expiry_hours.max(1));

    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![hash_token(&token), user_id, now, expires],
    )?;

    Ok((token, expires))
}

/// The active user behind an unexpired token.
pub fn session_user(conn: &Connection, token: &str) -> AppResult<Option<User>> {
    let now = Utc::now().naive_utc();
    let user_id: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
            params![hash_token(token), now],
            |row| row.get(0),
        )
        .optional()?;

    match user_id {
        Some(id) => Ok(User::get_by_id(conn, id)?.filter(|u| u.is_active)),
        None => Ok(None),
    }
}

pub fn destroy_session(conn: &Connection, token: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![hash_token(token)],
    )?;
    Ok(())
}

pub fn cleanup_expired_sessions(conn: &Connection) -> AppResult<usize> {
    let now = Utc::now().naive_utc();
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(removed)
}

/// Stable key for throttling login attempts without keeping raw emails in memory.
pub fn login_key(email: &str) -> String {
    format!("login:{}", hash_token(&email.trim().to_lowercase()))
}
