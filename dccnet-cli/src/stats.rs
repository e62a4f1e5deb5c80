//! Statistics display and formatting

use dccnet_protocol::ConnectionStats;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Print a summary of one transfer to stderr
pub fn display_stats(stats: &ConnectionStats, elapsed: Duration) {
    eprintln!("\n┌─────────────────────────────────────────────────────────────┐");
    eprintln!("│ TRANSFER STATISTICS                                         │");
    eprintln!("├─────────────────────────────────────────────────────────────┤");
    eprintln!("│ Elapsed:   {}", format_duration(elapsed));
    eprintln!(
        "│ Payload:   {} sent / {} received",
        format_bytes(stats.bytes_enqueued),
        format_bytes(stats.bytes_delivered)
    );
    eprintln!(
        "│ Frames:    {} sent / {} acked / {} retransmitted",
        stats.frames_sent, stats.frames_acked, stats.retransmissions
    );
    eprintln!(
        "│ Received:  {} frames / {} acks sent / {} duplicates",
        stats.frames_received, stats.acks_sent, stats.duplicates
    );
    eprintln!(
        "│ Dropped:   {} discarded / {} stale acks / {} resyncs",
        stats.frames_discarded, stats.stale_acks, stats.resyncs
    );
    eprintln!("└─────────────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 01m 01s");
    }
}
