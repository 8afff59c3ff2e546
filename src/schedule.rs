use chrono::{DateTime, Duration, Utc};

use crate::attend::{CoreError, Session};

/// Where a session sits relative to a wall-clock instant. Recomputed
/// on every query; there is no stored state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Upcoming,
    Active,
    Past,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Upcoming => "upcoming",
            SessionState::Active => "active",
            SessionState::Past => "past",
        }
    }
}

/// Parse the session's stored RFC 3339 window. Rejects windows where
/// the start is not strictly before the end.
pub fn session_window(session: &Session) -> Result<(DateTime<Utc>, DateTime<Utc>), CoreError> {
    let starts_at = parse_instant(&session.starts_at, "startsAt")?;
    let ends_at = parse_instant(&session.ends_at, "endsAt")?;
    if starts_at >= ends_at {
        return Err(CoreError::bad_params(
            "session startsAt must be before endsAt",
        ));
    }
    Ok((starts_at, ends_at))
}

pub fn parse_instant(raw: &str, field: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::bad_params(format!("{} is not RFC 3339: {}", field, e)))
}

/// Active iff now is in [start, end); the end instant is already Past.
pub fn classify(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> SessionState {
    if now < start {
        SessionState::Upcoming
    } else if now < end {
        SessionState::Active
    } else {
        SessionState::Past
    }
}

/// Signed: negative once the session has started. Callers decide how
/// to render negatives.
pub fn time_until_start(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    start - now
}

/// Signed: negative once the session has ended.
pub fn time_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    end - now
}
