//! Service-line description: the first-line-item text the field crew sees.

use chrono::{Datelike, NaiveDate};

use crate::common::types::ServiceType;

/// Hard cap on the composed description.
pub const MAX_DESCRIPTION_CHARS: usize = 255;

const SEPARATOR: &str = " - ";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Default)]
pub struct ServiceLineInputs<'a> {
    pub service_type: Option<ServiceType>,
    pub custom_instructions: Option<&'a str>,
    pub same_day: bool,
    pub owner_arriving: bool,
    pub long_term: bool,
    /// Check-in of the next entry when that entry is a block.
    pub next_block_checkin: Option<NaiveDate>,
    /// Next guest reservation's check-in, when known.
    pub next_guest_checkin: Option<NaiveDate>,
}

/// Compose the description: custom instructions, flag markers, then the
/// base name, joined by ` - ` and capped at 255 characters with the
/// custom-instructions component truncated first.
pub fn service_line_description(inputs: &ServiceLineInputs<'_>) -> String {
    let service = inputs
        .service_type
        .unwrap_or(ServiceType::Turnover)
        .as_str();

    let base = if inputs.same_day {
        format!("SAME DAY {service} STR")
    } else if let Some(block_day) = inputs.next_block_checkin {
        format!("OWNER ARRIVING {service} STR {}", month_day(block_day))
    } else if let Some(guest_day) = inputs.next_guest_checkin {
        format!("{service} STR Next Guest {}", month_day(guest_day))
    } else {
        format!("{service} STR Next Guest Unknown")
    };
    // The owner-arriving base variant already announces the arrival; the
    // standalone marker is only needed with the other bases.
    let base_mentions_owner = inputs.next_block_checkin.is_some() && !inputs.same_day;

    let mut fixed: Vec<String> = Vec::new();
    if inputs.owner_arriving && !base_mentions_owner {
        fixed.push("OWNER ARRIVING".to_string());
    }
    if inputs.long_term && !inputs.owner_arriving {
        fixed.push("LONG TERM GUEST DEPARTING".to_string());
    }
    fixed.push(base);

    let fixed_len: usize = fixed.iter().map(|c| c.chars().count()).sum::<usize>()
        + SEPARATOR.chars().count() * (fixed.len() - 1);

    let mut components: Vec<String> = Vec::new();
    if let Some(custom) = inputs.custom_instructions.map(str::trim).filter(|c| !c.is_empty()) {
        let budget = MAX_DESCRIPTION_CHARS
            .saturating_sub(fixed_len)
            .saturating_sub(SEPARATOR.chars().count());
        if let Some(fitted) = truncate_chars(custom, budget) {
            components.push(fitted);
        }
    }
    components.extend(fixed);

    components.join(SEPARATOR)
}

/// `September 10` style date, business-calendar flavored.
fn month_day(date: NaiveDate) -> String {
    format!("{} {}", date.format("%B"), date.day())
}

/// Fit `text` into `budget` characters, ellipsized. Returns `None` when
/// the budget is too small to say anything.
fn truncate_chars(text: &str, budget: usize) -> Option<String> {
    if budget < 2 {
        return None;
    }
    let count = text.chars().count();
    if count <= budget {
        return Some(text.to_string());
    }
    let mut out: String = text.chars().take(budget - 1).collect();
    out.push(ELLIPSIS);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn base_variants() {
        let mut inputs = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            ..Default::default()
        };
        assert_eq!(
            service_line_description(&inputs),
            "Turnover STR Next Guest Unknown"
        );

        inputs.next_guest_checkin = Some(date("2025-09-14"));
        assert_eq!(
            service_line_description(&inputs),
            "Turnover STR Next Guest September 14"
        );

        inputs.same_day = true;
        assert_eq!(service_line_description(&inputs), "SAME DAY Turnover STR");
    }

    #[test]
    fn owner_arrival_base_replaces_marker() {
        let inputs = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            owner_arriving: true,
            next_block_checkin: Some(date("2025-09-10")),
            ..Default::default()
        };
        let description = service_line_description(&inputs);
        assert_eq!(description, "OWNER ARRIVING Turnover STR September 10");
    }

    #[test]
    fn long_term_suppressed_by_owner_arrival() {
        let inputs = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            long_term: true,
            owner_arriving: true,
            next_block_checkin: Some(date("2025-09-10")),
            ..Default::default()
        };
        assert!(!service_line_description(&inputs).contains("LONG TERM"));

        let departing = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            long_term: true,
            ..Default::default()
        };
        assert_eq!(
            service_line_description(&departing),
            "LONG TERM GUEST DEPARTING - Turnover STR Next Guest Unknown"
        );
    }

    #[test]
    fn custom_instructions_truncate_first() {
        let long = "x".repeat(400);
        let inputs = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            custom_instructions: Some(&long),
            same_day: true,
            ..Default::default()
        };
        let description = service_line_description(&inputs);
        assert!(description.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(description.contains('…'));
        assert!(description.ends_with("SAME DAY Turnover STR"));
    }

    #[test]
    fn non_ascii_round_trips() {
        let inputs = ServiceLineInputs {
            service_type: Some(ServiceType::Turnover),
            custom_instructions: Some("café llaves en caja"),
            ..Default::default()
        };
        assert!(service_line_description(&inputs).starts_with("café llaves en caja - "));
    }
}
