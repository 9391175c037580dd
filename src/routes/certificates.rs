use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::certificates::{self, CertificateTestForm, CompletedCertificates, UserCertificates};
use crate::db::DbPool;
use crate::error::AppResult;
use crate::security::auth::AuthenticatedUser;

#[post("/certificate-test", format = "json", data = "<form>")]
pub fn submit_certificate_test(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
    form: Json<CertificateTestForm>,
) -> AppResult<status::Custom<Json<Value>>> {
    let input = form.into_inner().validate()?;
    let mut conn = pool.get()?;
    let outcome = certificates::submit_certificate_test(&mut conn, auth.user.id, &input)?;

    Ok(status::Custom(
        Status::Created,
        Json(json!({
            "status": "success",
            "message": "Certificate test recorded",
            "test_id": outcome.test_id,
            "score": outcome.score,
            "correct_answers": outcome.correct_answers,
            "total_questions": outcome.total_questions,
            "passed": outcome.passed,
        })),
    ))
}

#[get("/certificates")]
pub fn user_certificates(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
) -> AppResult<Json<UserCertificates>> {
    let conn = pool.get()?;
    Ok(Json(certificates::user_certificates(&conn, auth.user.id)?))
}

#[get("/certificates/completed")]
pub fn completed_certificates(
    auth: AuthenticatedUser,
    pool: &State<DbPool>,
) -> AppResult<Json<CompletedCertificates>> {
    let conn = pool.get()?;
    Ok(Json(certificates::completed_certificates(&conn, auth.user.id)?))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![submit_certificate_test, user_certificates, completed_certificates]
}
