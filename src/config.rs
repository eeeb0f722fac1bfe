use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub admin_token: String,
    pub scheduling_api_url: String,
    pub scheduling_api_token: String,
    pub settings_cache_ttl_secs: u64,
    pub max_offered_slots: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            scheduling_api_url: env::var("SCHEDULING_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
            scheduling_api_token: env::var("SCHEDULING_API_TOKEN").unwrap_or_default(),
            settings_cache_ttl_secs: env::var("SETTINGS_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_offered_slots: env::var("MAX_OFFERED_SLOTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
        }
    }
}
