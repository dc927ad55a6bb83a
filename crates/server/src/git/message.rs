// Commit labels for auto-save snapshots.

use chrono::{DateTime, TimeZone};

/// Wall-clock format used in commit labels, e.g. `10/16/2026, 3:04:05 PM`.
pub const LABEL_TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Context for one auto-save commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveLabel<Tz: TimeZone> {
    /// Images present in the uploads directory when the attempt ran.
    pub photos: usize,
    pub timestamp: DateTime<Tz>,
}

impl<Tz: TimeZone> SaveLabel<Tz>
where
    Tz::Offset: std::fmt::Display,
{
    pub fn new(photos: usize, timestamp: DateTime<Tz>) -> Self {
        Self { photos, timestamp }
    }

    /// `Auto-save: <N> photos | <timestamp>`
    pub fn render(&self) -> String {
        format!(
            "Auto-save: {} photos | {}",
            self.photos,
            self.timestamp.format(LABEL_TIMESTAMP_FORMAT)
        )
    }
}
