use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::program::Program;
use crate::models::progress::ProgramProgressView;
use crate::progress::{self, TrackTrailAccessForm, UserProgressSnapshot};
use crate::security::auth::AuthenticatedUser;

// ── Trail visit ────────────────────────────────────────

#[post("/trail-access", format = "json", data = "<form>")]
pub fn track_trail_access(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    form: Json<TrackTrailAccessForm>,
) -> AppResult<status::Custom<Json<Value>>> {
    let visit = form.validate()?;
    let mut conn = pool.get()?;
    let outcome = progress::track_trail_access(&mut conn, auth.user.id, &visit)?;

    let code = if outcome.trail_access.is_first_access {
        Status::Created
    } else {
        Status::Ok
    };
    Ok(status::Custom(
        code,
        Json(json!({
            "status": "success",
            "message": "Access recorded",
            "trail_access": outcome.trail_access,
            "program_progress": outcome.program_progress,
        })),
    ))
}

// ── Snapshots ──────────────────────────────────────────

#[get("/progress")]
pub fn user_progress(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
) -> AppResult<Json<UserProgressSnapshot>> {
    let mut conn = pool.get()?;
    Ok(Json(progress::user_snapshot(&mut conn, auth.user.id)?))
}

#[get("/progress/<program>")]
pub fn program_progress(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    program: &str,
) -> AppResult<Json<ProgramProgressView>> {
    let program: Program = program
        .parse()
        .map_err(|e: crate::models::program::InvalidChoice| {
            AppError::validation("program", e.to_string())
        })?;
    let conn = pool.get()?;
    Ok(Json(progress::program_snapshot(&conn, auth.user.id, program)?))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![track_trail_access, user_progress, program_progress]
}
