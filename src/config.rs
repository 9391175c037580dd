use rocket::figment::Figment;
use serde::Deserialize;

/// Application settings read from `Rocket.toml` / `ROCKET_*` env vars.
/// Every field has a default so the service starts with an empty config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    /// Directory served at `/media`; badge artwork lives under `badges/`.
    pub media_root: String,
    /// Base used when building absolute badge image URLs.
    pub public_url: String,
    pub session_expiry_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: "website/db/trailbadge.db".to_string(),
            media_root: "website/media".to_string(),
            public_url: "http://localhost:8000".to_string(),
            session_expiry_hours: 24,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        match figment.extract::<AppConfig>() {
            Ok(cfg) => cfg.sanitized(),
            Err(e) => {
                log::warn!("Invalid application config ({}), using defaults", e);
                AppConfig::default()
            }
        }
    }

    /// Config as the server itself would see it, for CLI commands run outside Rocket.
    pub fn load() -> Self {
        Self::from_figment(&rocket::Config::figment())
    }

    fn sanitized(mut self) -> Self {
        self.session_expiry_hours = self.session_expiry_hours.max(1);
        self.public_url = self.public_url.trim_end_matches('/').to_string();
        self
    }

    /// URL prefix under which `media_root` is exposed.
    pub fn media_url(&self) -> String {
        format!("{}/media/", self.public_url)
    }
}
