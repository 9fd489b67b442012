//! Diagnostics summary for status displays

use crate::state::TrackerSnapshot;
use chrono::{DateTime, Utc};
use magnet_common::events::{ProviderState, TrackingState};
use magnet_common::{time, uuid_utils};
use std::fmt;
use uuid::Uuid;

/// One overlay row of the summary
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRow {
    pub id: Uuid,
    pub reference_name: String,
    pub title: String,
    /// "Tracked" or "Paused"
    pub label: &'static str,
    pub scale: f32,
    /// Time since the anchor was last observed
    pub age_ms: u64,
}

/// Read-only status digest of one tracker snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsSummary {
    pub state: TrackingState,
    pub provider_state: ProviderState,
    pub active: usize,
    /// Denominator of "active X/Y": the larger of reported and configured
    pub capacity: usize,
    pub configured: usize,
    pub reported: usize,
    pub tracked_names: Vec<String>,
    pub multiple_tracked: bool,
    pub last_event: String,
    pub last_event_age_ms: Option<u64>,
    /// Rows sorted case-insensitively by reference name
    pub rows: Vec<AnchorRow>,
}

impl DiagnosticsSummary {
    pub fn from_snapshot(snapshot: &TrackerSnapshot, now: DateTime<Utc>) -> Self {
        let metrics = &snapshot.metrics;

        let mut rows: Vec<AnchorRow> = snapshot
            .overlays
            .values()
            .map(|overlay| AnchorRow {
                id: overlay.id,
                reference_name: overlay.reference_name.clone(),
                title: overlay.info.title.clone(),
                label: overlay.tracking_label(),
                scale: overlay.estimated_scale_factor,
                age_ms: time::elapsed_ms(overlay.last_observation_date, now),
            })
            .collect();
        rows.sort_by(|a, b| {
            a.reference_name
                .to_lowercase()
                .cmp(&b.reference_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });

        Self {
            state: snapshot.state.clone(),
            provider_state: metrics.provider_state,
            active: metrics.actively_tracked_anchors,
            capacity: metrics.reported_anchors.max(metrics.total_configured),
            configured: metrics.total_configured,
            reported: metrics.reported_anchors,
            tracked_names: metrics.tracked_reference_names.clone(),
            multiple_tracked: metrics.multiple_tracked(),
            last_event: metrics.last_event_description.clone(),
            last_event_age_ms: metrics
                .last_event_date
                .map(|date| time::elapsed_ms(date, now)),
            rows,
        }
    }

    /// Tracked names joined for display, "none" when empty
    pub fn tracked_label(&self) -> String {
        if self.tracked_names.is_empty() {
            "none".to_string()
        } else {
            self.tracked_names.join(", ")
        }
    }
}

impl fmt::Display for DiagnosticsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.state.status_description())?;
        writeln!(f, "Provider: {}", self.provider_state)?;
        writeln!(f, "Active: {}/{}", self.active, self.capacity)?;
        writeln!(f, "Configured: {} (reported {})", self.configured, self.reported)?;
        writeln!(f, "Tracked: {}", self.tracked_label())?;
        if self.multiple_tracked {
            writeln!(f, "Multiple magnets tracked at once")?;
        }
        match self.last_event_age_ms {
            Some(age) => writeln!(f, "Last event: {} ({} ms ago)", self.last_event, age)?,
            None => writeln!(f, "Last event: {}", self.last_event)?,
        }
        for row in &self.rows {
            writeln!(
                f,
                "  {:<12} {:<7} scale {:.3}  seen {} ms ago  [{}] {}",
                row.reference_name,
                row.label,
                row.scale,
                row.age_ms,
                uuid_utils::short(&row.id),
                row.title
            )?;
        }
        Ok(())
    }
}
