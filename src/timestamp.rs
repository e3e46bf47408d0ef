use mkvx::structs::timecode::Timecode;

/// Formats a timecode as HH:MM:SS.mmm; hours widen past 99.
pub fn time_str(timecode: Timecode) -> String {
    let ms = timecode.as_nanos().max(0) as u64 / 1_000_000;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[test]
fn format_time() {
    assert_eq!(time_str(Timecode::ZERO), "00:00:00.000");
    assert_eq!(
        time_str(Timecode::from_nanos(3_723_456_789_000)),
        "01:02:03.456"
    );
    assert_eq!(
        time_str(Timecode::from_nanos(360_000_000_000_000)),
        "100:00:00.000"
    );
}
