use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::badges::{self, AvailableBadges, BadgeStatsReport, CompleteChallengeForm, UserBadges};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::security::auth::AuthenticatedUser;

#[post("/challenge-complete", format = "json", data = "<form>")]
pub fn complete_challenge(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    form: Json<CompleteChallengeForm>,
) -> AppResult<status::Custom<Json<Value>>> {
    let input = form.validate()?;
    let mut conn = pool.get()?;
    let outcome = badges::complete_challenge(&mut conn, config, auth.user.id, &input)?;

    let code = if outcome.is_first_completion {
        Status::Created
    } else {
        Status::Ok
    };
    let mut body = serde_json::to_value(&outcome)?;
    body["status"] = json!("success");
    Ok(status::Custom(code, Json(body)))
}

#[get("/badges")]
pub fn user_badges(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
) -> AppResult<Json<UserBadges>> {
    let mut conn = pool.get()?;
    Ok(Json(badges::user_badges(&mut conn, config, auth.user.id)?))
}

#[get("/badges/available")]
pub fn available_badges(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
) -> AppResult<Json<AvailableBadges>> {
    let conn = pool.get()?;
    Ok(Json(badges::available_badges(&conn, config, auth.user.id)?))
}

#[get("/badges/stats")]
pub fn badge_stats(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
) -> AppResult<Json<BadgeStatsReport>> {
    let mut conn = pool.get()?;
    Ok(Json(badges::badge_stats(&mut conn, auth.user.id)?))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![complete_challenge, user_badges, available_badges, badge_stats]
}
