//! Session identifiers for grouping traces from one user session.

use chrono::Utc;
use uuid::Uuid;

/// Generate a session id of the form `session_{user}_{unix_millis}_{random}`.
///
/// Anonymous sessions use `anon` as the user segment.
pub fn generate_session_id(user_id: Option<&str>) -> String {
    let user = user_id.filter(|u| !u.is_empty()).unwrap_or("anon");
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "session_{}_{}_{}",
        user,
        Utc::now().timestamp_millis(),
        &random[..13]
    )
}
