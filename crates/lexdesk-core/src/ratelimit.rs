use rusqlite::{params, OptionalExtension};

use crate::{error::ApiError, store::Store};

/// Trailing window size in seconds.
pub const WINDOW_S: i64 = 3600;

/// Action names tracked per (principal, action) pair.
pub mod actions {
    pub const PETITION_ANALYSIS: &str = "petition_analysis";
    pub const PETITION_GENERATION: &str = "petition_generation";
    pub const JUDGE_ANALYSIS: &str = "judge_analysis";
    pub const CHAT_MESSAGE: &str = "chat_message";
}

/// Sliding-window call budget check.
///
/// Runs as a single exclusive transaction: read the window, drop instants
/// older than one hour, fail without appending when the budget is spent,
/// otherwise append now and persist. Two concurrent checks from the same
/// principal can therefore never both slip under the limit.
pub fn check(
    store: &Store,
    principal_id: &str,
    action: &str,
    max_per_hour: u32,
) -> Result<(), ApiError> {
    check_at(store, principal_id, action, max_per_hour, chrono::Utc::now().timestamp())
}

pub fn check_at(
    store: &Store,
    principal_id: &str,
    action: &str,
    max_per_hour: u32,
    now: i64,
) -> Result<(), ApiError> {
    let verdict = store.with_tx(|tx| {
        let stored: Option<String> = tx
            .query_row(
                "SELECT calls FROM rate_limits WHERE principal_id = ?1 AND action = ?2",
                params![principal_id, action],
                |row| row.get(0),
            )
            .optional()?;

        let mut calls: Vec<i64> = stored
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        calls.retain(|t| *t > now - WINDOW_S);

        if calls.len() >= max_per_hour as usize {
            let oldest = calls.first().copied().unwrap_or(now);
            return Ok(Some((oldest + WINDOW_S - now).max(1)));
        }

        calls.push(now);
        let encoded = serde_json::to_string(&calls).unwrap_or_else(|_| "[]".into());
        tx.execute(
            "INSERT INTO rate_limits (principal_id, action, calls) VALUES (?1, ?2, ?3)
             ON CONFLICT(principal_id, action) DO UPDATE SET calls = excluded.calls",
            params![principal_id, action, encoded],
        )?;
        Ok(None)
    })?;

    match verdict {
        Some(retry_after_s) => Err(ApiError::ResourceExhausted {
            action: action.to_string(),
            max_per_hour,
            retry_after_s,
        }),
        None => Ok(()),
    }
}
