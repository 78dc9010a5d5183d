//! The normalized reservation event every ingest source produces.

use chrono::{DateTime, NaiveDate, Utc};
use recordstore::Fields;
use serde_json::json;

use crate::common::identity::{Fingerprint, SignatureInputs, change_signature};
use crate::common::types::{BlockType, EntryType, EventSource, RecordStatus, ServiceType};
use crate::domains::reservations::models::reservation::{
    Reservation, fields, format_timestamp,
};

/// What the source asserts about the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// The booking exists with these attributes.
    Upsert,
    /// The source explicitly cancelled the booking.
    Remove,
}

/// One normalized event, whatever the upstream shape was.
#[derive(Debug, Clone)]
pub struct ReservationEvent {
    pub source: EventSource,
    pub action: EventAction,
    pub uid: String,
    /// Origin discriminator: real feed URL for calendar events, a source
    /// tag for CSV batches. `(uid, feed_url)` is the external identity.
    pub feed_url: String,
    pub property_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub entry_type: EntryType,
    pub block_type: Option<BlockType>,
    pub service_type: ServiceType,
    pub supplier_info: Option<String>,
    /// iTrip's explicit "Same Day?" column, when present.
    pub same_day_override: Option<bool>,
}

impl ReservationEvent {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            property_id: self.property_id.clone(),
            check_in: self.check_in,
            check_out: self.check_out,
            entry_type: self.entry_type,
        }
    }

    /// Signature for equivalence against an existing record. Flags the
    /// source does not carry are taken from the existing record so that
    /// reconciler-derived flags never read as an upstream modification.
    pub fn change_signature(&self, existing: Option<&Reservation>) -> String {
        let same_day = self
            .same_day_override
            .or_else(|| existing.map(Reservation::same_day))
            .unwrap_or(false);
        let overlapping = existing.map(Reservation::overlapping).unwrap_or(false);
        let carried_supplier;
        let supplier_info = if self.source.carries_supplier_info() {
            self.supplier_info.as_deref()
        } else {
            carried_supplier = existing.and_then(|r| r.supplier_info().map(str::to_string));
            carried_supplier.as_deref()
        };
        change_signature(&SignatureInputs {
            check_in: self.check_in,
            check_out: self.check_out,
            property_id: &self.property_id,
            entry_type: self.entry_type,
            service_type: self.service_type,
            same_day,
            overlapping,
            supplier_info,
            block_type: self.block_type,
        })
    }

    /// Field map for a brand-new record created from this event.
    pub fn create_fields(&self, now: DateTime<Utc>) -> Fields {
        let mut f = Fields::new();
        f.insert(fields::UID.into(), json!(self.uid));
        f.insert(fields::FEED_URL.into(), json!(self.feed_url));
        f.insert(fields::STATUS.into(), json!(RecordStatus::New.as_str()));
        f.insert(fields::MISSING_COUNT.into(), json!(0));
        f.insert(fields::LAST_SEEN.into(), json!(format_timestamp(now)));
        f.insert(fields::LAST_UPDATED.into(), json!(format_timestamp(now)));
        self.overwrite_owned_fields(&mut f);
        f
    }

    /// Overwrite the event-owned attributes on a field map (new record or
    /// modification clone). Job-link and sync fields are never touched.
    pub fn overwrite_owned_fields(&self, f: &mut Fields) {
        f.insert(fields::PROPERTY.into(), json!([self.property_id]));
        f.insert(
            fields::CHECK_IN.into(),
            json!(self.check_in.format("%Y-%m-%d").to_string()),
        );
        f.insert(
            fields::CHECK_OUT.into(),
            json!(self.check_out.format("%Y-%m-%d").to_string()),
        );
        f.insert(fields::ENTRY_TYPE.into(), json!(self.entry_type.as_str()));
        f.insert(
            fields::SERVICE_TYPE.into(),
            json!(self.service_type.as_str()),
        );
        match self.block_type {
            Some(bt) => {
                f.insert(fields::BLOCK_TYPE.into(), json!(bt.as_str()));
            }
            None => {
                f.remove(fields::BLOCK_TYPE);
            }
        }
        if self.source.carries_supplier_info() {
            match &self.supplier_info {
                Some(info) => {
                    f.insert(fields::SUPPLIER_INFO.into(), json!(info));
                }
                None => {
                    f.remove(fields::SUPPLIER_INFO);
                }
            }
        }
        if let Some(same_day) = self.same_day_override {
            f.insert(
                fields::ITRIP_SAME_DAY.into(),
                json!(if same_day { "Yes" } else { "No" }),
            );
            f.insert(fields::SAME_DAY.into(), json!(same_day));
        }
    }
}
