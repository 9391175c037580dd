use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::db;
use crate::error::AppResult;
use crate::models::badge::{badge_catalog, BadgeDefinition};
use crate::models::program::TOTAL_BADGES;
use crate::models::user::User;
use crate::security::auth;

#[derive(Parser, Debug)]
#[clap(
    name = "trailbadge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Trail progress, challenge badges and certificate tests"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Create any missing badge definitions
    SeedBadges {
        /// Only print the image files the catalog expects under the media root
        #[clap(long)]
        list_files: bool,
    },

    /// Create a staff account, or reset its password with --force
    SeedAdmin {
        #[clap(long, default_value = "admin@localhost")]
        email: String,
        #[clap(long)]
        password: String,
        /// Update the password if the account already exists
        #[clap(long)]
        force: bool,
    },
}

/// Outcome of `seed-admin`, reported back to the operator.
#[derive(Debug, PartialEq, Eq)]
pub enum AdminSeed {
    Created(i64),
    Updated(i64),
    Unchanged(i64),
}

pub fn open_store(config: &AppConfig) -> AppResult<db::DbPool> {
    let pool = db::init_pool(&config.database_path)?;
    db::run_migrations(&pool)?;
    Ok(pool)
}

pub fn seed_badges(config: &AppConfig, list_files: bool) -> AppResult<()> {
    if list_files {
        println!("Badge images expected under {}/:", config.media_root);
        for def in badge_catalog() {
            println!("  {}", def.badge_image);
        }
        println!("Total: {} files", TOTAL_BADGES);
        return Ok(());
    }

    let pool = open_store(config)?;
    let conn = pool.get()?;
    let created = db::seed_badge_catalog(&conn)?;
    let total = BadgeDefinition::count(&conn)?;
    println!(
        "{} badge definitions created, {}/{} in catalog",
        created, total, TOTAL_BADGES
    );
    if created > 0 {
        println!("Make sure the artwork exists under {}/badges/", config.media_root);
    }
    Ok(())
}

/// Create or update a staff account on an open connection.
pub fn upsert_admin(
    conn: &rusqlite::Connection,
    email: &str,
    password_hash: &str,
    force: bool,
) -> AppResult<AdminSeed> {
    match User::get_by_email(conn, email)? {
        Some(user) if force => {
            User::update_password(conn, user.id, password_hash)?;
            User::set_staff(conn, user.id, true)?;
            Ok(AdminSeed::Updated(user.id))
        }
        Some(user) => Ok(AdminSeed::Unchanged(user.id)),
        None => Ok(AdminSeed::Created(User::create(
            conn,
            email,
            password_hash,
            "Administrator",
            true,
        )?)),
    }
}

pub fn seed_admin(config: &AppConfig, email: &str, password: &str, force: bool) -> AppResult<()> {
    let pool = open_store(config)?;
    let conn = pool.get()?;
    let hash = auth::hash_password(password)?;

    match upsert_admin(&conn, email, &hash, force)? {
        AdminSeed::Created(id) => println!("Created admin {} (id {})", email, id),
        AdminSeed::Updated(id) => println!("Updated password for {} (id {})", email, id),
        AdminSeed::Unchanged(id) => println!(
            "{} already exists (id {}); pass --force to reset the password",
            email, id
        ),
    }
    Ok(())
}
