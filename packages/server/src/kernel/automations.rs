//! The `Automations` table: per-step enable switches and outcome
//! write-back.

use anyhow::Result;
use chrono::{DateTime, Utc};
use recordstore::{Fields, formula_escape};
use serde_json::json;
use tracing::{info, warn};

use crate::kernel::traits::RecordGateway;

pub const AUTOMATIONS_TABLE: &str = "Automations";

/// Field names in the Automations table.
pub mod fields {
    pub const NAME: &str = "Name";
    pub const ENABLED: &str = "Enabled";
    pub const LAST_RUN: &str = "Last Run";
    pub const SUCCESS: &str = "Success";
    pub const DURATION: &str = "Duration (s)";
    pub const MESSAGE: &str = "Message";
    pub const STATISTICS: &str = "Statistics";
}

/// One step's result, written back after the step runs.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub duration_seconds: f64,
    pub message: String,
    pub statistics: serde_json::Value,
}

pub struct AutomationGate<'a> {
    store: &'a dyn RecordGateway,
}

impl<'a> AutomationGate<'a> {
    pub fn new(store: &'a dyn RecordGateway) -> Self {
        Self { store }
    }

    /// Whether a step should run. Unknown steps are bootstrapped as
    /// enabled rows so a fresh base never silently skips work.
    pub async fn is_enabled(&self, name: &str) -> Result<bool> {
        match self.find_row(name).await? {
            Some(row) => Ok(row.bool_field(fields::ENABLED)),
            None => {
                let mut f = Fields::new();
                f.insert(fields::NAME.into(), json!(name));
                f.insert(fields::ENABLED.into(), json!(true));
                self.store.create(AUTOMATIONS_TABLE, f).await?;
                info!(step = name, "bootstrapped automation row");
                Ok(true)
            }
        }
    }

    /// Write a step's outcome. Failures here are logged, not propagated:
    /// reporting must never break the run it reports on.
    pub async fn record_outcome(&self, name: &str, outcome: &StepOutcome, now: DateTime<Utc>) {
        if let Err(e) = self.try_record(name, outcome, now).await {
            warn!(step = name, error = %e, "failed to record step outcome");
        }
    }

    async fn try_record(
        &self,
        name: &str,
        outcome: &StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let row_id = match self.find_row(name).await? {
            Some(row) => row.id,
            None => {
                let mut f = Fields::new();
                f.insert(fields::NAME.into(), json!(name));
                f.insert(fields::ENABLED.into(), json!(true));
                self.store.create(AUTOMATIONS_TABLE, f).await?.id
            }
        };

        let mut f = Fields::new();
        f.insert(
            fields::LAST_RUN.into(),
            json!(now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
        f.insert(fields::SUCCESS.into(), json!(outcome.success));
        f.insert(
            fields::DURATION.into(),
            json!((outcome.duration_seconds * 10.0).round() / 10.0),
        );
        f.insert(
            fields::MESSAGE.into(),
            json!(normalize_status_message(outcome.success, &outcome.message)),
        );
        f.insert(
            fields::STATISTICS.into(),
            json!(outcome.statistics.to_string()),
        );
        self.store.update(AUTOMATIONS_TABLE, &row_id, f).await?;
        Ok(())
    }

    async fn find_row(&self, name: &str) -> Result<Option<recordstore::Record>> {
        let formula = format!("{{{}}} = '{}'", fields::NAME, formula_escape(name));
        Ok(self
            .store
            .query(AUTOMATIONS_TABLE, &formula)
            .await?
            .into_iter()
            .next())
    }
}

const STATUS_ICONS: [&str; 3] = ["\u{2705}", "\u{274c}", "\u{26a0}\u{fe0f}"];

/// Exactly one leading status icon per message, whatever the caller
/// prefixed.
pub fn normalize_status_message(success: bool, message: &str) -> String {
    let mut rest = message.trim();
    loop {
        let mut stripped = false;
        for icon in STATUS_ICONS {
            if let Some(r) = rest.strip_prefix(icon) {
                rest = r.trim_start();
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }
    let icon = if success { STATUS_ICONS[0] } else { STATUS_ICONS[1] };
    format!("{icon} {rest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_icon_exactly() {
        assert_eq!(normalize_status_message(true, "done"), "\u{2705} done");
        assert_eq!(
            normalize_status_message(true, "\u{2705} \u{2705} done"),
            "\u{2705} done"
        );
        assert_eq!(
            normalize_status_message(false, "\u{2705} went wrong"),
            "\u{274c} went wrong"
        );
        assert_eq!(
            normalize_status_message(false, "\u{26a0}\u{fe0f} warned"),
            "\u{274c} warned"
        );
    }
}
