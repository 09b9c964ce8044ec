//! Shared formatting for the offline views.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use pq_protocol::queue_models::EntryStatus;
use uuid::Uuid;

/// Status text colored by outcome. Worker statuses convert into this too.
pub fn paint_status(status: impl Into<EntryStatus>) -> ColoredString {
    let status = status.into();
    let text = format!("{:<8}", status.as_str());
    match status {
        EntryStatus::Queued => text.normal(),
        EntryStatus::Running => text.yellow().bold(),
        EntryStatus::Finished => text.green(),
        EntryStatus::Failed | EntryStatus::Error => text.red(),
        EntryStatus::Stopped => text.dimmed(),
    }
}

/// First eight characters of an id, enough to tell rows apart.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Compact elapsed time between two instants, `-` when unfinished.
pub fn format_elapsed(start: Option<DateTime<Utc>>, finish: Option<DateTime<Utc>>) -> String {
    let (Some(start), Some(finish)) = (start, finish) else {
        return "-".to_string();
    };
    let secs = (finish - start).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
