use std::collections::HashMap;

use anyhow::Result;

/// Full application configuration.
/// Sensitive fields (API keys, signing secrets) come from env/.env only.
#[derive(Debug, Clone)]
pub struct Config {
    // AI providers
    pub gemini_api_key: String,
    pub anthropic_api_key: String,
    /// Multimodal JSON-constrained model (analysis, structuring, reports).
    pub analysis_model: String,
    /// Long-form drafting model (petition text, judge reports).
    pub drafting_model: String,
    /// Lighter drafting model used for chat turns.
    pub chat_model: String,

    // Storage
    pub data_dir: String,
    pub blob_dir: String,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    /// Base URL used when composing signed download links.
    pub public_base_url: String,

    // Auth & signing
    pub auth_secret: String,
    pub url_signing_key: String,
    pub download_url_ttl_s: i64,

    // Office identity fallback (tenant office settings override this).
    pub office_name: String,

    // Stage wall-clock budgets
    pub analysis_timeout_s: u64,
    pub generation_timeout_s: u64,
    pub chat_timeout_s: u64,

    // Rate limits (per principal, per hour)
    pub petition_analysis_per_hour: u32,
    pub petition_generation_per_hour: u32,
    pub judge_analysis_per_hour: u32,
    pub chat_messages_per_hour: u32,

    /// How many prior turns are replayed into each chat call.
    pub chat_history_window: usize,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u32(key: &str, dotenv: &HashMap<String, String>, default: u32) -> u32 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();

        Ok(Self {
            gemini_api_key: get_str("GEMINI_API_KEY", &dotenv, ""),
            anthropic_api_key: get_str("ANTHROPIC_API_KEY", &dotenv, ""),
            analysis_model: get_str("ANALYSIS_MODEL", &dotenv, "gemini-2.0-flash"),
            drafting_model: get_str("DRAFTING_MODEL", &dotenv, "claude-sonnet-4-5"),
            chat_model: get_str("CHAT_MODEL", &dotenv, "claude-haiku-4-5"),

            data_dir: get_str("DATA_DIR", &dotenv, "store"),
            blob_dir: get_str("BLOB_DIR", &dotenv, "store/blobs"),

            web_bind: get_str("WEB_BIND", &dotenv, "0.0.0.0"),
            web_port: get_u32("WEB_PORT", &dotenv, 8080) as u16,
            public_base_url: get_str("PUBLIC_BASE_URL", &dotenv, "http://localhost:8080"),

            auth_secret: get_str("AUTH_SECRET", &dotenv, ""),
            url_signing_key: get_str("URL_SIGNING_KEY", &dotenv, ""),
            download_url_ttl_s: get_u64("DOWNLOAD_URL_TTL_S", &dotenv, 7 * 24 * 3600) as i64,

            office_name: get_str("OFFICE_NAME", &dotenv, "LEXDESK"),

            analysis_timeout_s: get_u64("ANALYSIS_TIMEOUT_S", &dotenv, 120),
            generation_timeout_s: get_u64("GENERATION_TIMEOUT_S", &dotenv, 300),
            chat_timeout_s: get_u64("CHAT_TIMEOUT_S", &dotenv, 60),

            petition_analysis_per_hour: get_u32("PETITION_ANALYSIS_PER_HOUR", &dotenv, 20),
            petition_generation_per_hour: get_u32("PETITION_GENERATION_PER_HOUR", &dotenv, 10),
            judge_analysis_per_hour: get_u32("JUDGE_ANALYSIS_PER_HOUR", &dotenv, 10),
            chat_messages_per_hour: get_u32("CHAT_MESSAGES_PER_HOUR", &dotenv, 100),

            chat_history_window: get_u64("CHAT_HISTORY_WINDOW", &dotenv, 20) as usize,
        })
    }
}
