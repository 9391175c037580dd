#[macro_use]
extern crate rocket;

use clap::Parser;
use rocket::fs::{FileServer, Options};
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use serde_json::{json, Value};

mod badges;
mod boot;
mod certificates;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod progress;
mod rate_limit;
mod routes;
mod security;

#[cfg(test)]
mod tests;

use cli::{Cli, Command};
use config::AppConfig;
use db::DbPool;
use rate_limit::RateLimiter;

#[catch(400)]
fn bad_request() -> Json<Value> {
    Json(json!({ "error": "Malformed request" }))
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(json!({ "error": "authentication required" }))
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Value> {
    Json(json!({ "error": format!("No route for {}", req.uri().path()) }))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(json!({ "error": "Request body has the wrong shape" }))
}

#[catch(500)]
fn server_error() -> Json<Value> {
    Json(json!({ "error": "Internal server error" }))
}

/// Assemble the application around an already-migrated pool.
pub fn build_rocket(pool: DbPool, config: AppConfig) -> Rocket<Build> {
    let media = FileServer::new(&config.media_root, Options::Missing);

    rocket::build()
        .manage(pool)
        .manage(config)
        .manage(RateLimiter::default())
        .mount("/media", media)
        .mount("/api", routes::api_routes())
        .register(
            "/",
            catchers![bad_request, unauthorized, not_found, unprocessable, server_error],
        )
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Boot check: verify/create directories, report missing artwork
    if !boot::run(&config).ok() {
        return Err("boot check failed".into());
    }

    let pool = db::init_pool(&config.database_path)?;
    db::run_migrations(&pool)?;
    db::seed_defaults(&pool)?;

    log::info!("Serving badge images from {}", config.media_root);
    build_rocket(pool, config).launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::load();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::SeedBadges { list_files } => {
            cli::seed_badges(&config, list_files).map_err(Into::into)
        }
        Command::SeedAdmin {
            email,
            password,
            force,
        } => cli::seed_admin(&config, &email, &password, force).map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
