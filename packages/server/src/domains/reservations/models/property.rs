//! Property model and ingest-time resolution.

use std::collections::HashMap;

use recordstore::Record;

use crate::common::types::ServiceType;

/// Field names in the Properties table.
pub mod fields {
    pub const NAME: &str = "Property Name";
    pub const LISTING_NUMBER: &str = "Listing Number";
    pub const OWNER_NAME: &str = "Owner Name";
    pub const CUSTOMER_ID: &str = "Customer ID";
    pub const ADDRESS_ID: &str = "Address ID";
    pub const TURNOVER_TEMPLATE: &str = "Turnover Job Template ID";
    pub const RETURN_LAUNDRY_TEMPLATE: &str = "Return Laundry Job Template ID";
    pub const INSPECTION_TEMPLATE: &str = "Inspection Job Template ID";
}

pub const PROPERTIES_TABLE: &str = "Properties";

/// A cleanable unit. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub listing_number: Option<i64>,
    pub owner_name: Option<String>,
    pub customer_id: Option<String>,
    pub address_id: Option<String>,
    pub turnover_template_id: Option<String>,
    pub return_laundry_template_id: Option<String>,
    pub inspection_template_id: Option<String>,
}

impl Property {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.str_field(fields::NAME)?.to_string();
        Some(Self {
            id: record.id.clone(),
            name,
            listing_number: record.int_field(fields::LISTING_NUMBER),
            owner_name: record.str_field(fields::OWNER_NAME).map(str::to_string),
            customer_id: record.str_field(fields::CUSTOMER_ID).map(str::to_string),
            address_id: record.str_field(fields::ADDRESS_ID).map(str::to_string),
            turnover_template_id: record
                .str_field(fields::TURNOVER_TEMPLATE)
                .map(str::to_string),
            return_laundry_template_id: record
                .str_field(fields::RETURN_LAUNDRY_TEMPLATE)
                .map(str::to_string),
            inspection_template_id: record
                .str_field(fields::INSPECTION_TEMPLATE)
                .map(str::to_string),
        })
    }

    /// Template job to clone line items from, per service type.
    pub fn template_id(&self, service: ServiceType) -> Option<&str> {
        match service {
            ServiceType::Turnover | ServiceType::NeedsReview => {
                self.turnover_template_id.as_deref()
            }
            ServiceType::ReturnLaundry => self.return_laundry_template_id.as_deref(),
            ServiceType::Inspection => self.inspection_template_id.as_deref(),
        }
    }
}

/// In-memory lookup over the Properties table for one run. No fuzzy
/// matching: unresolved rows are skipped and counted by the caller.
#[derive(Debug, Default)]
pub struct PropertyResolver {
    properties: Vec<Property>,
    by_name: HashMap<String, usize>,
    by_listing: HashMap<i64, usize>,
    by_id: HashMap<String, usize>,
}

impl PropertyResolver {
    pub fn new(properties: Vec<Property>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_listing = HashMap::new();
        let mut by_id = HashMap::new();
        for (i, p) in properties.iter().enumerate() {
            by_name.insert(p.name.trim().to_lowercase(), i);
            if let Some(listing) = p.listing_number {
                by_listing.insert(listing, i);
            }
            by_id.insert(p.id.clone(), i);
        }
        Self {
            properties,
            by_name,
            by_listing,
            by_id,
        }
    }

    pub fn from_records(records: &[Record]) -> Self {
        Self::new(records.iter().filter_map(Property::from_record).collect())
    }

    /// Case-insensitive exact match on property name (iTrip).
    pub fn by_name(&self, name: &str) -> Option<&Property> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.properties[i])
    }

    /// Exact listing-number match (Evolve).
    pub fn by_listing(&self, listing: i64) -> Option<&Property> {
        self.by_listing.get(&listing).map(|&i| &self.properties[i])
    }

    pub fn by_id(&self, id: &str) -> Option<&Property> {
        self.by_id.get(id).map(|&i| &self.properties[i])
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Pull the listing number out of an Evolve property label, e.g.
/// `"Evolve #12345 Cozy Cabin"` or `"12345 - Cozy Cabin"`.
pub fn extract_listing_number(property_label: &str) -> Option<i64> {
    let mut digits = String::new();
    for c in property_label.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_number_extraction() {
        assert_eq!(extract_listing_number("Evolve #12345 Cozy Cabin"), Some(12345));
        assert_eq!(extract_listing_number("98765 - Lakeside"), Some(98765));
        assert_eq!(extract_listing_number("No digits here"), None);
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let resolver = PropertyResolver::new(vec![Property {
            id: "recP1".into(),
            name: "Desert Rose".into(),
            listing_number: Some(12345),
            owner_name: None,
            customer_id: None,
            address_id: None,
            turnover_template_id: None,
            return_laundry_template_id: None,
            inspection_template_id: None,
        }]);
        assert!(resolver.by_name("  DESERT rose ").is_some());
        assert!(resolver.by_name("Desert").is_none());
        assert!(resolver.by_listing(12345).is_some());
    }
}
