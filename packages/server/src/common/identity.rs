//! Booking identity: UID construction, fingerprints, change signatures.
//!
//! External identity is `(UID, Feed URL)`. Some calendar providers rotate
//! UIDs between fetches, so logical identity falls back to the fingerprint
//! `(property, check-in, check-out, entry type)`.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::common::types::{BlockType, EntryType, ServiceType};

/// Collapse runs of non-alphanumerics into single underscores, trim, and
/// lowercase. Stable under whitespace and case variation of the input.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Deterministic UID for CSV-born events:
/// `{source}_{property}_{checkin}_{checkout}_{guest-or-block}`.
pub fn csv_uid(
    source: &str,
    property_name: &str,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guest_last_name: Option<&str>,
) -> String {
    let guest = match guest_last_name {
        Some(name) if !slug(name).is_empty() => slug(name),
        _ => "block".to_string(),
    };
    format!(
        "{}_{}_{}_{}_{}",
        source.to_lowercase(),
        slug(property_name),
        check_in.format("%Y-%m-%d"),
        check_out.format("%Y-%m-%d"),
        guest
    )
}

/// Fallback logical identity for dynamic-UID sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub property_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub entry_type: EntryType,
}

/// Inputs to the change signature. Job-system fields are deliberately
/// absent: a job id or sync status change must never look like a booking
/// modification.
#[derive(Debug, Clone)]
pub struct SignatureInputs<'a> {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub property_id: &'a str,
    pub entry_type: EntryType,
    pub service_type: ServiceType,
    pub same_day: bool,
    pub overlapping: bool,
    pub supplier_info: Option<&'a str>,
    pub block_type: Option<BlockType>,
}

/// Content hash governing modification detection. Two records are
/// equivalent iff their signatures match.
pub fn change_signature(inputs: &SignatureInputs<'_>) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}",
        inputs.check_in.format("%Y-%m-%d"),
        inputs.check_out.format("%Y-%m-%d"),
        inputs.property_id,
        inputs.entry_type.as_str(),
        inputs.service_type.as_str(),
        inputs.same_day,
        inputs.overlapping,
        inputs.supplier_info.unwrap_or(""),
        inputs.block_type.map(|b| b.as_str()).unwrap_or(""),
    );
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn slug_collapses_runs() {
        assert_eq!(slug("Desert  Rose -- Unit #2"), "desert_rose_unit_2");
        assert_eq!(slug("  O'Brien "), "o_brien");
        assert_eq!(slug("___"), "");
    }

    #[test]
    fn uid_stable_under_case_and_whitespace() {
        let a = csv_uid(
            "itrip",
            "Desert Rose",
            date("2025-08-01"),
            date("2025-08-05"),
            Some("Smith"),
        );
        let b = csv_uid(
            "iTrip",
            "  desert  ROSE ",
            date("2025-08-01"),
            date("2025-08-05"),
            Some("  SMITH "),
        );
        assert_eq!(a, b);
        assert_eq!(a, "itrip_desert_rose_2025-08-01_2025-08-05_smith");
    }

    #[test]
    fn uid_block_fallback() {
        let uid = csv_uid(
            "evolve",
            "Cabin 7",
            date("2025-09-01"),
            date("2025-09-03"),
            None,
        );
        assert!(uid.ends_with("_block"));
    }

    #[test]
    fn signature_ignores_nothing_it_includes() {
        let base = SignatureInputs {
            check_in: date("2025-08-01"),
            check_out: date("2025-08-05"),
            property_id: "recP1",
            entry_type: EntryType::Reservation,
            service_type: ServiceType::Turnover,
            same_day: false,
            overlapping: false,
            supplier_info: None,
            block_type: None,
        };
        let sig = change_signature(&base);
        assert_eq!(sig, change_signature(&base.clone()));

        let mut moved = base.clone();
        moved.check_out = date("2025-08-06");
        assert_ne!(sig, change_signature(&moved));

        let mut flagged = base.clone();
        flagged.same_day = true;
        assert_ne!(sig, change_signature(&flagged));

        let mut remarked = base;
        remarked.supplier_info = Some("hot tub service");
        assert_ne!(sig, change_signature(&remarked));
    }
}
