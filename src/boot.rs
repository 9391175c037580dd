use log::{error, info, warn};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;
use crate::models::badge::{badge_catalog, DEFAULT_BADGE_IMAGE};

/// Outcome of the pre-launch checks.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootReport {
    pub warnings: u32,
    pub errors: u32,
}

impl BootReport {
    pub fn ok(&self) -> bool {
        self.errors == 0
    }
}

/// Run all boot checks. Call this before Rocket launches.
/// Creates missing directories and warns about missing badge artwork.
/// Missing images are not fatal: URLs fall back to the default image.
pub fn run(config: &AppConfig) -> BootReport {
    info!("Boot check starting...");
    let mut report = BootReport::default();

    // ── 1. Directories ─────────────────────────────────
    let db_dir = Path::new(&config.database_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);
    let badges_dir = Path::new(&config.media_root).join("badges");

    for dir in db_dir.iter().chain(std::iter::once(&badges_dir)) {
        if !dir.exists() {
            match fs::create_dir_all(dir) {
                Ok(_) => info!("  Created directory: {}", dir.display()),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir.display(), e);
                    report.errors += 1;
                }
            }
        }
    }

    // ── 2. Database directory writable ──────────────────
    if let Some(dir) = db_dir.as_ref().filter(|d| d.exists()) {
        let test_file = dir.join(".write_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                error!("  Database directory not writable: {}", e);
                report.errors += 1;
            }
        }
    }

    // ── 3. Badge artwork ───────────────────────────────
    let media_root = Path::new(&config.media_root);
    if !media_root.join(DEFAULT_BADGE_IMAGE).is_file() {
        warn!("  Missing fallback badge image: {}", DEFAULT_BADGE_IMAGE);
        report.warnings += 1;
    }
    let missing = badge_catalog()
        .iter()
        .filter(|def| !media_root.join(&def.badge_image).is_file())
        .count();
    if missing > 0 {
        warn!(
            "  {} badge image(s) missing under {} (run `seed-badges --list-files`)",
            missing,
            badges_dir.display()
        );
        report.warnings += 1;
    }

    // ── 4. Rocket.toml exists ───────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found, using default config");
        report.warnings += 1;
    }

    // ── Summary ─────────────────────────────────────────
    if !report.ok() {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s).",
            report.errors, report.warnings
        );
    } else if report.warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            report.warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }

    report
}
