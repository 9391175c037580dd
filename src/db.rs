use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};

use crate::error::AppResult;
use crate::models::badge::badge_catalog;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool(path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(path)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;"));
    let pool = Pool::builder().max_size(10).build(manager)?;

    // WAL is persistent on the file, one connection is enough
    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> AppResult<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Accounts
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            is_staff INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL
        );

        -- Bearer sessions (only the SHA-256 of the token is kept)
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        -- Access ledger
        CREATE TABLE IF NOT EXISTS trail_accesses (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            program TEXT NOT NULL,
            trail_id TEXT NOT NULL,
            trail_number INTEGER NOT NULL CHECK (trail_number BETWEEN 1 AND 4),
            first_access DATETIME NOT NULL,
            last_access DATETIME NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 1,
            UNIQUE(user_id, trail_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_access_user_program ON trail_accesses(user_id, program);
        CREATE INDEX IF NOT EXISTS idx_access_user_last ON trail_accesses(user_id, last_access);

        -- Per-program rollup
        CREATE TABLE IF NOT EXISTS user_program_progress (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            program TEXT NOT NULL,
            last_accessed_trail INTEGER NOT NULL DEFAULT 0,
            trails_accessed TEXT NOT NULL DEFAULT '[]',
            total_access_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(user_id, program),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Cross-program rollup
        CREATE TABLE IF NOT EXISTS user_overall_progress (
            user_id INTEGER PRIMARY KEY,
            total_trails_accessed INTEGER NOT NULL DEFAULT 0,
            total_access_count INTEGER NOT NULL DEFAULT 0,
            programs_started TEXT NOT NULL DEFAULT '[]',
            programs_completed TEXT NOT NULL DEFAULT '[]',
            first_access DATETIME,
            last_access DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Static badge catalog
        CREATE TABLE IF NOT EXISTS badge_definitions (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            program TEXT NOT NULL,
            trail_number INTEGER NOT NULL CHECK (trail_number BETWEEN 1 AND 4),
            difficulty TEXT NOT NULL,
            badge_type TEXT NOT NULL,
            badge_image TEXT NOT NULL DEFAULT 'badges/default.png',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL,
            UNIQUE(program, trail_number, difficulty)
        );

        -- Challenge ledger
        CREATE TABLE IF NOT EXISTS challenge_completions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            program TEXT NOT NULL,
            trail_number INTEGER NOT NULL CHECK (trail_number BETWEEN 1 AND 4),
            difficulty TEXT NOT NULL,
            challenge_id INTEGER,
            score REAL,
            attempts INTEGER NOT NULL DEFAULT 1,
            completion_time_seconds INTEGER,
            completed_at DATETIME NOT NULL,
            UNIQUE(user_id, program, trail_number, difficulty),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_completions_user ON challenge_completions(user_id, completed_at);

        -- Awarded badges
        CREATE TABLE IF NOT EXISTS user_badges (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            badge_definition_id INTEGER NOT NULL,
            challenge_completion_id INTEGER UNIQUE NOT NULL,
            earned_at DATETIME NOT NULL,
            UNIQUE(user_id, badge_definition_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (badge_definition_id) REFERENCES badge_definitions(id) ON DELETE CASCADE,
            FOREIGN KEY (challenge_completion_id) REFERENCES challenge_completions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_user_badges_user ON user_badges(user_id, earned_at);

        -- Badge rollup
        CREATE TABLE IF NOT EXISTS user_badge_stats (
            user_id INTEGER PRIMARY KEY,
            bronze_badges INTEGER NOT NULL DEFAULT 0,
            silver_badges INTEGER NOT NULL DEFAULT 0,
            gold_badges INTEGER NOT NULL DEFAULT 0,
            total_badges INTEGER NOT NULL DEFAULT 0,
            proind_badges INTEGER NOT NULL DEFAULT 0,
            prodepe_badges INTEGER NOT NULL DEFAULT 0,
            prodeauto_badges INTEGER NOT NULL DEFAULT 0,
            completion_percentage REAL NOT NULL DEFAULT 0,
            first_badge_earned DATETIME,
            last_badge_earned DATETIME,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Certificate exam log
        CREATE TABLE IF NOT EXISTS certificate_tests (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            program TEXT NOT NULL,
            track TEXT NOT NULL,
            score REAL NOT NULL,
            correct_answers INTEGER NOT NULL,
            total_questions INTEGER NOT NULL,
            passed INTEGER NOT NULL,
            answers TEXT NOT NULL DEFAULT '[]',
            started_at DATETIME NOT NULL,
            completed_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_certificates_user ON certificate_tests(user_id, completed_at);
        CREATE INDEX IF NOT EXISTS idx_certificates_passed ON certificate_tests(passed);
        ",
    )?;

    Ok(())
}

/// Create any missing badge definitions. Returns how many were inserted.
pub fn seed_badge_catalog(conn: &Connection) -> AppResult<usize> {
    let now = chrono::Utc::now().naive_utc();
    let mut created = 0;

    for def in badge_catalog() {
        created += conn.execute(
            "INSERT OR IGNORE INTO badge_definitions
                (name, description, program, trail_number, difficulty, badge_type, badge_image, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
            params![
                def.name,
                def.description,
                def.program,
                def.trail_number,
                def.difficulty,
                def.badge_type,
                def.badge_image,
                now
            ],
        )?;
    }

    Ok(created)
}

pub fn seed_defaults(pool: &DbPool) -> AppResult<()> {
    let conn = pool.get()?;
    let created = seed_badge_catalog(&conn)?;
    if created > 0 {
        log::info!("Seeded {} badge definitions", created);
    }
    Ok(())
}
