#![cfg(test)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::badges::{self, CompleteChallengeForm};
use crate::boot;
use crate::certificates::{self, CertificateTestForm};
use crate::cli::{upsert_admin, AdminSeed};
use crate::config::AppConfig;
use crate::db::{run_migrations, seed_badge_catalog, seed_defaults, DbPool};
use crate::error::AppError;
use crate::models::badge::{badge_catalog, resolve_image_url, BadgeDefinition, UserBadge};
use crate::models::badge_stats::UserBadgeStats;
use crate::models::certificate::{CertificateAnswer, CertificateTest};
use crate::models::challenge::{ChallengeCompletion, NewCompletion};
use crate::models::program::{round_to, BadgeType, Difficulty, Program, TOTAL_BADGES};
use crate::models::progress::{ProgramProgress, ProgramProgressView};
use crate::models::user::User;
use crate::progress::{self, TrackTrailAccessForm, TrailVisit};
use crate::rate_limit::RateLimiter;
use crate::security::auth;

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Fresh in-memory SQLite pool with migrations applied and the badge catalog seeded.
/// A named shared-cache DB lets the auth guard and the handler see the same data
/// through different pooled connections.
fn test_pool() -> DbPool {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:testdb_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder()
        .max_size(2)
        .build(manager)
        .expect("Failed to create test pool");
    run_migrations(&pool).expect("Failed to run migrations");
    seed_defaults(&pool).expect("Failed to seed defaults");
    pool
}

/// Fast bcrypt hash for tests (cost=4 instead of DEFAULT_COST=12).
fn fast_hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

fn make_user(conn: &rusqlite::Connection, email: &str) -> i64 {
    User::create(conn, email, &fast_hash("secret"), "Learner", false).unwrap()
}

/// Unique scratch directory under the system temp dir.
fn scratch_dir(tag: &str) -> PathBuf {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "trailbadge_{}_{}_{}",
        tag,
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_config() -> AppConfig {
    AppConfig {
        media_root: scratch_dir("media").to_string_lossy().into_owned(),
        ..AppConfig::default()
    }
}

fn visit(program: Program, trail_id: &str, trail_number: i64) -> TrailVisit {
    TrailVisit {
        program,
        trail_id: trail_id.to_string(),
        trail_number,
    }
}

fn completion(program: Program, trail_number: i64, difficulty: Difficulty, score: f64) -> NewCompletion {
    NewCompletion {
        program,
        trail_number,
        difficulty,
        score,
        challenge_id: None,
        completion_time_seconds: None,
    }
}

fn answers(correct: usize, total: usize) -> Vec<CertificateAnswer> {
    (0..total)
        .map(|i| CertificateAnswer {
            is_correct: i < correct,
            extra: serde_json::Map::new(),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Programs & catalog
// ═══════════════════════════════════════════════════════════

#[test]
fn program_parse_is_case_insensitive() {
    assert_eq!("proind".parse::<Program>().unwrap(), Program::Proind);
    assert_eq!(" PRODEAUTO ".parse::<Program>().unwrap(), Program::Prodeauto);
    let err = "PROX".parse::<Program>().unwrap_err();
    assert_eq!(err.to_string(), "\"PROX\" is not a valid choice.");
}

#[test]
fn difficulty_maps_to_badge_tier() {
    assert_eq!(Difficulty::Easy.badge_type(), BadgeType::Bronze);
    assert_eq!(Difficulty::Medium.badge_type(), BadgeType::Silver);
    assert_eq!(Difficulty::Hard.badge_type(), BadgeType::Gold);
}

#[test]
fn catalog_covers_every_key_once() {
    let catalog = badge_catalog();
    assert_eq!(catalog.len(), TOTAL_BADGES);

    let names: HashSet<_> = catalog.iter().map(|d| d.name.clone()).collect();
    assert_eq!(names.len(), TOTAL_BADGES);
    let keys: HashSet<_> = catalog
        .iter()
        .map(|d| (d.program, d.trail_number, d.difficulty))
        .collect();
    assert_eq!(keys.len(), TOTAL_BADGES);

    let first = &catalog[0];
    assert_eq!(first.badge_image, "badges/proind_t1_bronze.png");
    let last = &catalog[TOTAL_BADGES - 1];
    assert_eq!(last.badge_image, "badges/prodeauto_t4_gold.png");
}

#[test]
fn catalog_seed_is_idempotent() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    assert_eq!(BadgeDefinition::count(&conn).unwrap(), 36);
    assert_eq!(seed_badge_catalog(&conn).unwrap(), 0);
    assert_eq!(BadgeDefinition::count(&conn).unwrap(), 36);
}

#[test]
fn hand_inserted_badge_uses_column_default_image() {
    let pool = test_pool();
    let config = test_config();
    let conn = pool.get().unwrap();
    conn.execute(
        "DELETE FROM badge_definitions WHERE program = 'PROIND' AND trail_number = 1 AND difficulty = 'EASY'",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO badge_definitions (name, program, trail_number, difficulty, badge_type, created_at)
         VALUES ('Custom', 'PROIND', 1, 'EASY', 'BRONZE', ?1)",
        rusqlite::params![chrono::Utc::now().naive_utc()],
    )
    .unwrap();

    let def = BadgeDefinition::find_active(&conn, Program::Proind, 1, Difficulty::Easy)
        .unwrap()
        .unwrap();
    assert_eq!(def.badge_image, "badges/default.png");
    assert!(def.image_url(&config).ends_with("/media/badges/default.jpg"));
}

#[test]
fn image_url_falls_back_to_default() {
    let config = test_config();
    let path = "badges/proind_t1_bronze.png";
    assert_eq!(
        resolve_image_url(&config, path),
        "http://localhost:8000/media/badges/default.jpg"
    );

    let on_disk = PathBuf::from(&config.media_root).join(path);
    std::fs::create_dir_all(on_disk.parent().unwrap()).unwrap();
    std::fs::write(&on_disk, b"png").unwrap();
    assert_eq!(
        resolve_image_url(&config, path),
        "http://localhost:8000/media/badges/proind_t1_bronze.png"
    );
}

// ═══════════════════════════════════════════════════════════
// Trail progress
// ═══════════════════════════════════════════════════════════

#[test]
fn first_visit_creates_progress() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let out = progress::track_trail_access(&mut conn, uid, &visit(Program::Proind, "proind-1", 1)).unwrap();
    assert!(out.trail_access.is_first_access);
    assert_eq!(out.trail_access.access_count, 1);
    assert_eq!(out.program_progress.trails_accessed, vec![1]);
    assert_eq!(out.program_progress.progress_percentage, 25.0);
    assert_eq!(out.program_progress.next_trail, Some(2));
}

#[test]
fn repeat_visit_only_bumps_counters() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");
    let v = visit(Program::Prodepe, "prodepe-2", 2);

    progress::track_trail_access(&mut conn, uid, &v).unwrap();
    let out = progress::track_trail_access(&mut conn, uid, &v).unwrap();

    assert!(!out.trail_access.is_first_access);
    assert_eq!(out.trail_access.access_count, 2);
    assert_eq!(out.program_progress.trails_accessed, vec![2]);
    assert_eq!(out.program_progress.total_access_count, 2);
    assert_eq!(out.program_progress.progress_percentage, 25.0);
}

#[test]
fn visited_set_stays_sorted_with_gaps() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    progress::track_trail_access(&mut conn, uid, &visit(Program::Proind, "t3", 3)).unwrap();
    let out = progress::track_trail_access(&mut conn, uid, &visit(Program::Proind, "t1", 1)).unwrap();

    assert_eq!(out.program_progress.trails_accessed, vec![1, 3]);
    assert_eq!(out.program_progress.last_accessed_trail, 3);
    assert_eq!(out.program_progress.progress_percentage, 50.0);
    assert_eq!(out.program_progress.next_trail, Some(2));
    assert!(!out.program_progress.is_completed);
}

#[test]
fn all_four_trails_complete_a_program() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let mut last = None;
    for n in 1..=4 {
        let id = format!("prodeauto-{}", n);
        last = Some(progress::track_trail_access(&mut conn, uid, &visit(Program::Prodeauto, &id, n)).unwrap());
    }
    let view = last.unwrap().program_progress;
    assert!(view.is_completed);
    assert_eq!(view.progress_percentage, 100.0);
    assert_eq!(view.next_trail, None);
}

#[test]
fn reused_trail_id_credits_requested_program() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    progress::track_trail_access(&mut conn, uid, &visit(Program::Proind, "shared", 2)).unwrap();
    let out = progress::track_trail_access(&mut conn, uid, &visit(Program::Prodepe, "shared", 4)).unwrap();

    assert_eq!(out.program_progress.program, Program::Prodepe);
    assert_eq!(out.program_progress.trails_accessed, vec![4]);
    assert_eq!(out.program_progress.last_accessed_trail, 4);
    assert_eq!(out.trail_access.access_count, 2);
    assert!(!out.trail_access.is_first_access);

    // the access row still counts under the program of its first visit
    assert_eq!(out.program_progress.total_access_count, 0);
    let proind = ProgramProgress::find(&conn, uid, Program::Proind).unwrap().unwrap();
    assert_eq!(proind.trails_accessed, vec![2]);

    let snap = progress::user_snapshot(&mut conn, uid).unwrap();
    assert_eq!(snap.overall_progress.total_trails_accessed, 2);
    assert_eq!(snap.overall_progress.programs_started, vec![Program::Proind, Program::Prodepe]);
}

#[test]
fn overall_progress_sums_programs() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    for n in 1..=4 {
        progress::track_trail_access(&mut conn, uid, &visit(Program::Proind, &format!("i{}", n), n)).unwrap();
    }
    progress::track_trail_access(&mut conn, uid, &visit(Program::Prodepe, "d2", 2)).unwrap();
    progress::track_trail_access(&mut conn, uid, &visit(Program::Prodepe, "d2", 2)).unwrap();

    let snap = progress::user_snapshot(&mut conn, uid).unwrap();
    let overall = snap.overall_progress;
    assert_eq!(overall.total_trails_accessed, 5);
    assert_eq!(overall.total_access_count, 6);
    assert_eq!(overall.overall_percentage, 41.7);
    assert_eq!(overall.programs_started, vec![Program::Proind, Program::Prodepe]);
    assert_eq!(overall.programs_completed, vec![Program::Proind]);
    assert!(overall.first_access.is_some());
    assert!(overall.first_access <= overall.last_access);

    let programs: Vec<Program> = snap.program_progress.iter().map(|p| p.program).collect();
    assert_eq!(programs, vec![Program::Proind, Program::Prodepe]);
    assert_eq!(snap.total_challenges_completed, 0);
}

#[test]
fn snapshot_lists_ten_most_recent_accesses() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    for (i, program) in Program::ALL.iter().enumerate() {
        for n in 1..=4 {
            let id = format!("trail-{}-{}", i, n);
            progress::track_trail_access(&mut conn, uid, &visit(*program, &id, n)).unwrap();
        }
    }

    let snap = progress::user_snapshot(&mut conn, uid).unwrap();
    assert_eq!(snap.recent_accesses.len(), 10);
    assert_eq!(snap.overall_progress.overall_percentage, 100.0);
    assert_eq!(snap.overall_progress.programs_completed.len(), 3);
}

#[test]
fn unvisited_program_reads_as_empty() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let view = progress::program_snapshot(&conn, uid, Program::Prodepe).unwrap();
    assert_eq!(view, ProgramProgressView::empty(Program::Prodepe));
    assert_eq!(view.next_trail, Some(1));
    assert_eq!(view.progress_percentage, 0.0);
}

#[test]
fn trail_form_reports_every_bad_field() {
    let form = TrackTrailAccessForm::default();
    match form.validate() {
        Err(AppError::Validation(errors)) => {
            assert!(errors.get("program").is_some());
            assert!(errors.get("trail_id").is_some());
            assert!(errors.get("trail_number").is_some());
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let form = TrackTrailAccessForm {
        program: Some("PROIND".into()),
        trail_id: Some("x".repeat(101)),
        trail_number: Some(5),
    };
    match form.validate() {
        Err(AppError::Validation(errors)) => {
            assert!(errors.get("program").is_none());
            assert!(errors.get("trail_id").is_some());
            assert_eq!(
                errors.get("trail_number").unwrap()[0],
                "Ensure this value is between 1 and 4."
            );
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let ok = TrackTrailAccessForm {
        program: Some("prodepe".into()),
        trail_id: Some("  prodepe-3 ".into()),
        trail_number: Some(3),
    }
    .validate()
    .unwrap();
    assert_eq!(ok, visit(Program::Prodepe, "prodepe-3", 3));
}

// ═══════════════════════════════════════════════════════════
// Challenges & badges
// ═══════════════════════════════════════════════════════════

#[test]
fn first_completion_mints_exactly_one_badge() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let first = badges::complete_challenge(
        &mut conn,
        &config,
        uid,
        &completion(Program::Proind, 1, Difficulty::Easy, 80.0),
    )
    .unwrap();
    assert!(first.is_first_completion);
    assert_eq!(first.attempts, 1);
    let badge = first.badge_earned.expect("badge minted");
    assert_eq!(badge.badge.badge_type, BadgeType::Bronze);
    assert_eq!(badge.badge.image_path, "badges/proind_t1_bronze.png");
    assert!(badge.badge.image_url.ends_with("/media/badges/default.jpg"));

    let again = badges::complete_challenge(
        &mut conn,
        &config,
        uid,
        &completion(Program::Proind, 1, Difficulty::Easy, 95.0),
    )
    .unwrap();
    assert!(!again.is_first_completion);
    assert!(again.badge_earned.is_none());
    assert_eq!(again.attempts, 2);
    assert_eq!(again.score, Some(80.0));
    assert_eq!(again.completion_id, first.completion_id);

    assert_eq!(UserBadge::count_for_user(&conn, uid).unwrap(), 1);
    assert_eq!(ChallengeCompletion::count_for_user(&conn, uid).unwrap(), 1);
}

#[test]
fn inactive_definition_records_without_badge() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let def = BadgeDefinition::find_active(&conn, Program::Prodepe, 2, Difficulty::Hard)
        .unwrap()
        .unwrap();
    BadgeDefinition::set_active(&conn, def.id, false).unwrap();

    let key = completion(Program::Prodepe, 2, Difficulty::Hard, 70.0);
    let out = badges::complete_challenge(&mut conn, &config, uid, &key).unwrap();
    assert!(out.is_first_completion);
    assert!(out.badge_earned.is_none());

    // reactivating later does not award retroactively
    BadgeDefinition::set_active(&conn, def.id, true).unwrap();
    let out = badges::complete_challenge(&mut conn, &config, uid, &key).unwrap();
    assert!(out.badge_earned.is_none());
    assert_eq!(UserBadge::count_for_user(&conn, uid).unwrap(), 0);
}

#[test]
fn badge_stats_tally_tiers_and_programs() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    for (program, trail, difficulty) in [
        (Program::Proind, 1, Difficulty::Easy),
        (Program::Proind, 1, Difficulty::Medium),
        (Program::Proind, 2, Difficulty::Hard),
        (Program::Prodeauto, 4, Difficulty::Hard),
    ] {
        badges::complete_challenge(&mut conn, &config, uid, &completion(program, trail, difficulty, 90.0)).unwrap();
    }

    let report = badges::badge_stats(&mut conn, uid).unwrap();
    let stats = &report.overall_stats;
    assert_eq!(stats.bronze_badges, 1);
    assert_eq!(stats.silver_badges, 1);
    assert_eq!(stats.gold_badges, 2);
    assert_eq!(stats.total_badges, 4);
    assert_eq!(stats.total_badges, stats.bronze_badges + stats.silver_badges + stats.gold_badges);
    assert_eq!(stats.proind_badges, 3);
    assert_eq!(stats.prodepe_badges, 0);
    assert_eq!(stats.prodeauto_badges, 1);
    assert_eq!(stats.completion_percentage, 11.11);
    assert!(stats.first_badge_earned <= stats.last_badge_earned);

    let proind = &report.program_stats[0];
    assert_eq!(proind.program, Program::Proind);
    assert_eq!(proind.badges_earned, 3);
    assert_eq!(proind.total_possible, 12);
    assert_eq!(proind.percentage, 25.0);
    assert_eq!(report.program_stats[2].percentage, 8.3);
}

#[test]
fn earning_everything_caps_at_full_catalog() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    for def in badge_catalog() {
        let key = completion(def.program, def.trail_number, def.difficulty, 100.0);
        badges::complete_challenge(&mut conn, &config, uid, &key).unwrap();
        badges::complete_challenge(&mut conn, &config, uid, &key).unwrap();
    }

    let stats = UserBadgeStats::refreshed(&conn, uid).unwrap();
    assert_eq!(stats.total_badges, 36);
    assert_eq!(stats.completion_percentage, 100.0);

    let available = badges::available_badges(&conn, &config, uid).unwrap();
    assert_eq!(available.total_available, 0);
    assert_eq!(available.total_possible, 36);
}

#[test]
fn available_badges_exclude_earned_in_catalog_order() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    badges::complete_challenge(&mut conn, &config, uid, &completion(Program::Proind, 1, Difficulty::Easy, 60.0)).unwrap();

    let available = badges::available_badges(&conn, &config, uid).unwrap();
    assert_eq!(available.total_available, 35);
    assert_eq!(available.total_possible, 36);
    let first = &available.available_badges[0].badge;
    assert_eq!((first.program, first.trail_number, first.difficulty), (Program::Proind, 1, Difficulty::Medium));
    let last = &available.available_badges[34].badge;
    assert_eq!((last.program, last.trail_number, last.difficulty), (Program::Prodeauto, 4, Difficulty::Hard));
}

#[test]
fn user_badges_newest_first_with_score() {
    let pool = test_pool();
    let config = test_config();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    badges::complete_challenge(&mut conn, &config, uid, &completion(Program::Prodepe, 1, Difficulty::Easy, 55.5)).unwrap();
    badges::complete_challenge(&mut conn, &config, uid, &completion(Program::Prodepe, 3, Difficulty::Medium, 77.0)).unwrap();

    let listing = badges::user_badges(&mut conn, &config, uid).unwrap();
    assert_eq!(listing.badges.len(), 2);
    assert_eq!(listing.badges[0].badge.trail_number, 3);
    assert_eq!(listing.badges[0].score, Some(77.0));
    assert_eq!(listing.badges[1].score, Some(55.5));
    assert_eq!(listing.stats.prodepe_badges, 2);
}

#[test]
fn challenge_form_validates_and_rounds() {
    let bad = CompleteChallengeForm {
        program: Some("PROIND".into()),
        trail_number: Some(0),
        difficulty: Some("EXTREME".into()),
        score: Some(101.0),
        challenge_id: Some(-1),
        completion_time_seconds: None,
    };
    match bad.validate() {
        Err(AppError::Validation(errors)) => {
            assert!(errors.get("program").is_none());
            assert!(errors.get("trail_number").is_some());
            assert!(errors.get("difficulty").is_some());
            assert!(errors.get("score").is_some());
            assert!(errors.get("challenge_id").is_some());
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let ok = CompleteChallengeForm {
        program: Some("prodeauto".into()),
        trail_number: Some(4),
        difficulty: Some("hard".into()),
        score: Some(87.456),
        challenge_id: Some(12),
        completion_time_seconds: Some(300),
    }
    .validate()
    .unwrap();
    assert_eq!(ok.program, Program::Prodeauto);
    assert_eq!(ok.difficulty, Difficulty::Hard);
    assert_eq!(ok.score, 87.46);
}

#[test]
fn rounding_helper() {
    assert_eq!(round_to(1.0 / 3.0 * 100.0, 1), 33.3);
    assert_eq!(round_to(2.0 / 3.0 * 100.0, 2), 66.67);
}

// ═══════════════════════════════════════════════════════════
// Certificates
// ═══════════════════════════════════════════════════════════

#[test]
fn certificate_passed_flag_is_stored_as_sent() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    // answers without is_correct, as the quiz client sends them
    let raw: Vec<CertificateAnswer> = serde_json::from_value(json!([
        {"question_id": 1, "user_answer": 2},
        {"question_id": 2, "user_answer": 0},
        {"question_id": 3, "user_answer": 1},
        {"question_id": 4, "user_answer": 3},
        {"question_id": 5, "user_answer": 2}
    ]))
    .unwrap();

    let input = CertificateTestForm {
        program: Some("PROIND".into()),
        track: Some("foundations".into()),
        score: Some(80.0),
        passed: Some(true),
        answers: Some(raw),
    }
    .validate()
    .unwrap();
    assert!(input.passed);

    let outcome = certificates::submit_certificate_test(&mut conn, uid, &input).unwrap();
    assert!(outcome.passed);
    assert_eq!(outcome.correct_answers, 0);
    assert_eq!(outcome.total_questions, 5);

    let done = certificates::completed_certificates(&conn, uid).unwrap();
    assert_eq!(done.total_completed, 1);

    // a failing flag with every answer correct is kept too
    let input = CertificateTestForm {
        program: Some("PROIND".into()),
        track: Some("foundations".into()),
        score: Some(100.0),
        passed: Some(false),
        answers: Some(answers(3, 3)),
    }
    .validate()
    .unwrap();
    let outcome = certificates::submit_certificate_test(&mut conn, uid, &input).unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.correct_answers, 3);
}

#[test]
fn certificate_form_requires_fields() {
    match CertificateTestForm::default().validate() {
        Err(AppError::Validation(errors)) => {
            for field in ["program", "track", "score", "passed", "answers"] {
                assert!(errors.get(field).is_some(), "missing error for {}", field);
            }
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn certificate_answers_are_kept_verbatim() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let raw: Vec<CertificateAnswer> = serde_json::from_value(json!([
        {"question_id": 1, "selected": "b", "is_correct": true},
        {"question_id": 2, "selected": "d"}
    ]))
    .unwrap();
    assert!(!raw[1].is_correct);

    let input = CertificateTestForm {
        program: Some("PRODEPE".into()),
        track: Some("advanced".into()),
        score: Some(50.0),
        passed: Some(false),
        answers: Some(raw.clone()),
    }
    .validate()
    .unwrap();
    let outcome = certificates::submit_certificate_test(&mut conn, uid, &input).unwrap();
    assert_eq!(outcome.correct_answers, 1);
    assert_eq!(outcome.total_questions, 2);

    let stored = CertificateTest::list_for_user(&conn, uid, false).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].answers, raw);
    assert_eq!(stored[0].answers[0].extra["selected"], json!("b"));
}

#[test]
fn certificate_listings_split_passed_and_failed() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    for (track, passed, correct) in [("basics", true, 5), ("advanced", false, 2), ("expert", true, 4)] {
        let input = CertificateTestForm {
            program: Some("PROIND".into()),
            track: Some(track.into()),
            score: Some(correct as f64 * 20.0),
            passed: Some(passed),
            answers: Some(answers(correct, 5)),
        }
        .validate()
        .unwrap();
        certificates::submit_certificate_test(&mut conn, uid, &input).unwrap();
    }

    let all = certificates::user_certificates(&conn, uid).unwrap();
    assert_eq!(all.total_certificates, 3);
    assert_eq!(all.passed_certificates, 2);
    assert_eq!(all.failed_certificates, 1);
    assert_eq!(all.certificates[0].track, "expert");
    assert_eq!(all.certificates[1].status, "failed");

    let done = certificates::completed_certificates(&conn, uid).unwrap();
    assert_eq!(done.total_completed, 2);
    assert_eq!(done.completed_certificates[0].certificate_id, "PROIND-expert");
    assert_eq!(done.completed_certificates[1].certificate_id, "PROIND-basics");
}

// ═══════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════

#[test]
fn session_lifecycle() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let (token, expires) = auth::create_session(&conn, uid, 24).unwrap();
    assert_eq!(token.len(), 64);
    assert!(expires > chrono::Utc::now().naive_utc());
    assert_eq!(auth::session_user(&conn, &token).unwrap().unwrap().id, uid);
    assert!(auth::session_user(&conn, "not-a-token").unwrap().is_none());

    auth::destroy_session(&conn, &token).unwrap();
    assert!(auth::session_user(&conn, &token).unwrap().is_none());
}

#[test]
fn expired_sessions_are_rejected_and_cleaned() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");

    let (token, _) = auth::create_session(&conn, uid, 1).unwrap();
    let past = chrono::Utc::now().naive_utc() - chrono::Duration::hours(2);
    conn.execute(
        "UPDATE sessions SET expires_at = ?1",
        rusqlite::params![past],
    )
    .unwrap();

    assert!(auth::session_user(&conn, &token).unwrap().is_none());
    assert_eq!(auth::cleanup_expired_sessions(&conn).unwrap(), 1);
}

#[test]
fn inactive_user_loses_session() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    let uid = make_user(&conn, "a@example.com");
    let (token, _) = auth::create_session(&conn, uid, 24).unwrap();

    User::set_active(&conn, uid, false).unwrap();
    assert!(auth::session_user(&conn, &token).unwrap().is_none());
}

#[test]
fn bearer_header_parsing() {
    assert_eq!(auth::parse_bearer("Bearer abc"), Some("abc"));
    assert_eq!(auth::parse_bearer("bearer  abc "), Some("abc"));
    assert_eq!(auth::parse_bearer("Basic abc"), None);
    assert_eq!(auth::parse_bearer("Bearer "), None);
    assert_eq!(auth::parse_bearer("abc"), None);
}

#[test]
fn user_email_lookup_ignores_case() {
    let pool = test_pool();
    let conn = pool.get().unwrap();
    let uid = make_user(&conn, "Mixed@Example.com");

    let user = User::get_by_email(&conn, "MIXED@example.COM").unwrap().unwrap();
    assert_eq!(user.id, uid);
    assert_eq!(user.email, "mixed@example.com");
}

#[test]
fn admin_seed_respects_force() {
    let pool = test_pool();
    let conn = pool.get().unwrap();

    let first = upsert_admin(&conn, "root@localhost", &fast_hash("one"), false).unwrap();
    let id = match first {
        AdminSeed::Created(id) => id,
        other => panic!("expected Created, got {:?}", other),
    };
    let user = User::get_by_id(&conn, id).unwrap().unwrap();
    assert!(user.is_staff);

    assert_eq!(
        upsert_admin(&conn, "root@localhost", &fast_hash("two"), false).unwrap(),
        AdminSeed::Unchanged(id)
    );
    let user = User::get_by_id(&conn, id).unwrap().unwrap();
    assert!(auth::verify_password("one", &user.password_hash));

    assert_eq!(
        upsert_admin(&conn, "root@localhost", &fast_hash("two"), true).unwrap(),
        AdminSeed::Updated(id)
    );
    let user = User::get_by_id(&conn, id).unwrap().unwrap();
    assert!(auth::verify_password("two", &user.password_hash));
}

#[test]
fn rate_limiter_blocks_after_max() {
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    assert!(limiter.allows("k"));
    limiter.record_failure("k");
    assert!(limiter.allows("k"));
    limiter.record_failure("k");
    assert!(!limiter.allows("k"));
    assert!(limiter.allows("other"));
    limiter.reset("k");
    assert!(limiter.allows("k"));
}

#[test]
fn rate_limiter_forgets_stale_keys() {
    let limiter = RateLimiter::new(3, Duration::from_millis(50));
    limiter.record_failure("login:a");
    limiter.record_failure("login:b");
    assert_eq!(limiter.tracked_keys(), 2);

    std::thread::sleep(Duration::from_millis(120));

    // checking a key whose window has passed drops it
    assert!(limiter.allows("login:a"));
    assert_eq!(limiter.tracked_keys(), 1);

    // recording any failure sweeps the rest
    limiter.record_failure("login:c");
    assert_eq!(limiter.tracked_keys(), 1);

    limiter.cleanup();
    assert_eq!(limiter.tracked_keys(), 1);
}

// ═══════════════════════════════════════════════════════════
// Config & boot
// ═══════════════════════════════════════════════════════════

#[test]
fn config_sanitizes_out_of_range_values() {
    use rocket::figment::Figment;

    let figment = Figment::new()
        .merge(("session_expiry_hours", 0))
        .merge(("public_url", "https://learn.example.org/"));
    let config = AppConfig::from_figment(&figment);
    assert_eq!(config.session_expiry_hours, 1);
    assert_eq!(config.media_url(), "https://learn.example.org/media/");
    assert_eq!(config.media_root, "website/media");
}

#[test]
fn boot_creates_directories() {
    let root = scratch_dir("boot");
    let config = AppConfig {
        database_path: root.join("db/app.db").to_string_lossy().into_owned(),
        media_root: root.join("media").to_string_lossy().into_owned(),
        ..AppConfig::default()
    };

    let report = boot::run(&config);
    assert!(report.ok());
    assert!(report.warnings >= 1);
    assert!(root.join("db").is_dir());
    assert!(root.join("media/badges").is_dir());
}

// ═══════════════════════════════════════════════════════════
// HTTP API
// ═══════════════════════════════════════════════════════════

fn client_with_user() -> (Client, String) {
    let pool = test_pool();
    {
        let conn = pool.get().unwrap();
        User::create(&conn, "learner@example.com", &fast_hash("secret"), "Learner", false).unwrap();
    }
    let client = Client::tracked(crate::build_rocket(pool, test_config())).expect("valid rocket");

    let res = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(json!({"email": "learner@example.com", "password": "secret"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["token_type"], "Bearer");
    let token = body["token"].as_str().unwrap().to_string();
    (client, token)
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

#[test]
fn api_requires_token() {
    let (client, _) = client_with_user();
    let res = client.get("/api/progress").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
    let body: Value = res.into_json().unwrap();
    assert!(body["error"].is_string());

    let res = client.get("/api/badges").header(bearer("bogus")).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn api_login_rejects_bad_password() {
    let (client, _) = client_with_user();
    let res = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(json!({"email": "learner@example.com", "password": "nope"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    let res = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(json!({"email": ""}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: Value = res.into_json().unwrap();
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[test]
fn api_me_and_logout() {
    let (client, token) = client_with_user();
    let res = client.get("/api/auth/me").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["email"], "learner@example.com");
    assert!(body.get("password_hash").is_none());

    let res = client.post("/api/auth/logout").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let res = client.get("/api/auth/me").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn api_trail_access_created_then_ok() {
    let (client, token) = client_with_user();
    let payload = json!({"program": "PROIND", "trail_id": "proind-trail-1", "trail_number": 1}).to_string();

    let res = client
        .post("/api/trail-access")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(payload.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["trail_access"]["is_first_access"], true);
    assert_eq!(body["program_progress"]["progress_percentage"], 25.0);

    let res = client
        .post("/api/trail-access")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(payload)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["trail_access"]["access_count"], 2);

    let res = client.get("/api/progress/proind").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["trails_accessed"], json!([1]));
    assert_eq!(body["next_trail"], 2);
}

#[test]
fn api_trail_access_validation() {
    let (client, token) = client_with_user();
    let res = client
        .post("/api/trail-access")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({"program": "NOPE", "trail_id": "", "trail_number": 9}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: Value = res.into_json().unwrap();
    assert!(body["errors"]["program"].is_array());
    assert!(body["errors"]["trail_id"].is_array());
    assert!(body["errors"]["trail_number"].is_array());

    let res = client.get("/api/progress/NOPE").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn api_progress_snapshot_for_new_user() {
    let (client, token) = client_with_user();
    let res = client.get("/api/progress").header(bearer(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["program_progress"], json!([]));
    assert_eq!(body["overall_progress"]["overall_percentage"], 0.0);
    assert_eq!(body["recent_accesses"], json!([]));
    assert_eq!(body["total_challenges_completed"], 0);
}

#[test]
fn api_challenge_complete_mints_badge() {
    let (client, token) = client_with_user();
    let payload = json!({
        "program": "PRODEPE",
        "trail_number": 2,
        "difficulty": "MEDIUM",
        "score": 88.5,
        "completion_time_seconds": 120
    })
    .to_string();

    let res = client
        .post("/api/challenge-complete")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(payload.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["is_first_completion"], true);
    assert_eq!(body["badge_earned"]["type"], "SILVER");
    assert_eq!(body["badge_earned"]["image_path"], "badges/prodepe_t2_silver.png");

    let res = client
        .post("/api/challenge-complete")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(payload)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["badge_earned"], Value::Null);
    assert_eq!(body["attempts"], 2);

    let res = client.get("/api/badges/stats").header(bearer(&token)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["overall_stats"]["silver_badges"], 1);
    assert_eq!(body["program_stats"][1]["program"], "PRODEPE");
    assert_eq!(body["program_stats"][1]["badges_earned"], 1);

    let res = client.get("/api/badges/available").header(bearer(&token)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["total_available"], 35);

    let res = client.get("/api/badges").header(bearer(&token)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["badges"].as_array().unwrap().len(), 1);
    assert_eq!(body["badges"][0]["score"], 88.5);
}

#[test]
fn api_certificate_submission() {
    let (client, token) = client_with_user();
    let res = client
        .post("/api/certificate-test")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "program": "PRODEAUTO",
                "track": "operations",
                "score": 80,
                "passed": true,
                "answers": [
                    {"q": 1, "is_correct": true},
                    {"q": 2, "is_correct": true},
                    {"q": 3, "is_correct": true},
                    {"q": 4, "is_correct": true},
                    {"q": 5, "is_correct": false}
                ]
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["correct_answers"], 4);
    assert_eq!(body["total_questions"], 5);
    assert_eq!(body["passed"], true);

    let res = client
        .post("/api/certificate-test")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "program": "PRODEAUTO",
                "track": "operations",
                "score": 80,
                "passed": true,
                "answers": [
                    {"question_id": 1, "user_answer": 2},
                    {"question_id": 2, "user_answer": 0},
                    {"question_id": 3, "user_answer": 1},
                    {"question_id": 4, "user_answer": 3},
                    {"question_id": 5, "user_answer": 2}
                ]
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Created);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["passed"], true);
    assert_eq!(body["correct_answers"], 0);
    assert_eq!(body["total_questions"], 5);

    let res = client
        .post("/api/certificate-test")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({"program": "PRODEAUTO", "track": "operations", "score": 50, "answers": []}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: Value = res.into_json().unwrap();
    assert!(body["errors"]["passed"].is_array());

    let res = client.get("/api/certificates/completed").header(bearer(&token)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["total_completed"], 2);
    assert_eq!(body["completed_certificates"][0]["certificate_id"], "PRODEAUTO-operations");

    let res = client.get("/api/certificates").header(bearer(&token)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["total_certificates"], 2);
    assert_eq!(body["failed_certificates"], 0);
    assert_eq!(body["certificates"][0]["status"], "passed");
}

#[test]
fn api_unknown_route_is_json_404() {
    let (client, _) = client_with_user();
    let res = client.get("/api/nowhere").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: Value = res.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().contains("/api/nowhere"));
}
