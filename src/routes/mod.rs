pub mod auth;
pub mod badges;
pub mod certificates;
pub mod progress;

/// Everything served under `/api`.
pub fn api_routes() -> Vec<rocket::Route> {
    let mut all = auth::routes();
    all.extend(progress::routes());
    all.extend(badges::routes());
    all.extend(certificates::routes());
    all
}
