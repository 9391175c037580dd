use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::user::User;
use crate::rate_limit::RateLimiter;
use crate::security::auth::{self, AuthenticatedUser};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[post("/auth/login", format = "json", data = "<form>")]
pub fn login(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    limiter: &State<RateLimiter>,
    form: Json<LoginForm>,
) -> AppResult<Json<Value>> {
    let mut errors = FieldErrors::new();
    if form.email.trim().is_empty() {
        errors.add("email", "This field is required.");
    }
    if form.password.is_empty() {
        errors.add("password", "This field is required.");
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let key = auth::login_key(&form.email);
    if !limiter.allows(&key) {
        log::warn!("Login throttled for {}", form.email.trim());
        return Err(AppError::RateLimited);
    }

    let conn = pool.get()?;
    let user = match User::get_by_email(&conn, &form.email)? {
        Some(u) if u.is_active && auth::verify_password(&form.password, &u.password_hash) => u,
        _ => {
            limiter.record_failure(&key);
            log::warn!("Failed login for {}", form.email.trim());
            return Err(AppError::Unauthorized);
        }
    };
    limiter.reset(&key);

    auth::cleanup_expired_sessions(&conn)?;
    let (token, expires_at) = auth::create_session(&conn, user.id, config.session_expiry_hours)?;
    log::info!("user {} logged in", user.id);

    Ok(Json(json!({
        "token": token,
        "token_type": "Bearer",
        "expires_at": expires_at,
        "user": user,
    })))
}

#[post("/auth/logout")]
pub fn logout(auth: AuthenticatedUser, pool: &State<DbPool>) -> AppResult<Json<Value>> {
    let conn = pool.get()?;
    auth::destroy_session(&conn, &auth.token)?;
    Ok(Json(json!({ "status": "success" })))
}

#[get("/auth/me")]
pub fn me(auth: AuthenticatedUser) -> Json<User> {
    Json(auth.user)
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, logout, me]
}
