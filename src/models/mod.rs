pub mod badge;
pub mod badge_stats;
pub mod certificate;
pub mod challenge;
pub mod program;
pub mod progress;
pub mod trail_access;
pub mod user;
