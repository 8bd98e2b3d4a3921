//! Activity plugin settings, read from the manifest `[properties]` table.

use chrono::{Local, NaiveDateTime};

use ska_plugin_sdk::prelude::ModuleScope;

/// Format of `expire_time`.
pub const EXPIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default path prefix guarded by the expiry checks.
pub const DEFAULT_PATH_PREFIX: &str = "/api/activities";

/// Settings for one activity plugin instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityProperties {
    /// Raw `expire_time` value, echoed back in rejections.
    pub expire_time: Option<String>,
    /// Parsed `expire_time`. `None` when absent or unparseable.
    pub expires_at: Option<NaiveDateTime>,
    /// Paths at or below this prefix are checked.
    pub path_prefix: String,
}

impl ActivityProperties {
    pub fn from_scope(scope: &ModuleScope) -> Self {
        let expire_time = scope
            .property("expire_time")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        Self {
            expires_at: expire_time.as_deref().and_then(parse_expire_time),
            expire_time,
            path_prefix: scope
                .property("path_prefix")
                .unwrap_or(DEFAULT_PATH_PREFIX)
                .to_string(),
        }
    }

    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Expiry check against local wall-clock time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Local::now().naive_local())
    }

    pub fn expire_time_display(&self) -> &str {
        self.expire_time.as_deref().unwrap_or("")
    }
}

fn parse_expire_time(raw: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(raw, EXPIRE_TIME_FORMAT) {
        Ok(at) => Some(at),
        Err(e) => {
            tracing::warn!(
                expire_time = raw,
                error = %e,
                "Unparseable expire_time, treating as never expiring"
            );
            None
        }
    }
}
