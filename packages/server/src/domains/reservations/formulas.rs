//! Filter formulas the engine sends to the record store.

use recordstore::formula_escape;

use crate::domains::reservations::models::reservation::fields;

/// Active (non-`Old`) records for one external identity.
pub fn active_by_uid(uid: &str, feed_url: &str) -> String {
    format!(
        "AND({{{}}} = '{}', {{{}}} = '{}', {{{}}} != 'Old')",
        fields::UID,
        formula_escape(uid),
        fields::FEED_URL,
        formula_escape(feed_url),
        fields::STATUS,
    )
}

/// Active records originating from one feed.
pub fn active_by_feed(feed_url: &str) -> String {
    format!(
        "AND({{{}}} = '{}', {{{}}} != 'Old')",
        fields::FEED_URL,
        formula_escape(feed_url),
        fields::STATUS,
    )
}

/// All active records.
pub fn active() -> String {
    format!("{{{}}} != 'Old'", fields::STATUS)
}

/// Active record holding a given downstream job id.
pub fn active_by_job_id(job_id: &str) -> String {
    format!(
        "AND({{{}}} = '{}', {{{}}} != 'Old')",
        fields::JOB_ID,
        formula_escape(job_id),
        fields::STATUS,
    )
}
