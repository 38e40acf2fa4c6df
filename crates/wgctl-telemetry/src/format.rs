//! Human-readable formatting helpers for byte counts, elapsed time, and
//! durations, as surfaced in a peer status snapshot.

use chrono::{DateTime, Utc};

/// Formats a byte count as `"0 B"`, `"512 B"`, `"1.2 KB"`, etc., using IEC
/// (1024-based) steps with SI-style unit labels.
#[must_use]
pub fn format_bytes(bytes: f64) -> String {
    if bytes == 0.0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}

/// Formats a transfer rate as a `".../s"` string.
#[must_use]
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Formats a timestamp as `"Just now"`, `"N min ago"`, `"Nh ago"`,
/// `"Nd ago"`, or `"Never"` if absent.
#[must_use]
pub fn format_time_ago(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "Never".to_string();
    };

    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0);

    if seconds < 60 {
        "Just now".to_string()
    } else if seconds < 3600 {
        format!("{} min ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86400)
    }
}

/// Formats an elapsed duration in seconds as `"0s"`, `"45s"`, `"3m"`,
/// `"2h 5m"`, or `"1d 4h"`.
#[must_use]
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| *s >= 0.0) else {
        return "0s".to_string();
    };
    let seconds = seconds as i64;

    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{hours}h")
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!("{days}d {hours}h")
        } else {
            format!("{days}d")
        }
    }
}
