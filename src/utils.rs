use std::time::Duration;

/// Render time for CLI summaries. Renders are seconds-scale: sub-second
/// values print in milliseconds, sub-minute values with centisecond
/// precision, and batch runs in minutes.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        format!("{}m {}s", duration.as_secs() / 60, duration.as_secs() % 60)
    }
}

/// PDF payload size for CLI summaries, in binary units. Documents larger
/// than a few hundred MiB do not come out of this pipeline, so two units
/// suffice.
pub fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    let size = bytes as f64;
    if size >= MIB {
        format!("{:.1} MiB", size / MIB)
    } else if size >= KIB {
        format!("{:.1} KiB", size / KIB)
    } else {
        format!("{bytes} B")
    }
}
