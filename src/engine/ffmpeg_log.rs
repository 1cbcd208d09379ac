use std::collections::VecDeque;

/// Parse the version token out of `ffmpeg -version` output.
pub fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?.trim();
    let rest = first.strip_prefix("ffmpeg version ")?;
    let version = rest.split_whitespace().next()?;
    Some(version.to_string())
}

/// Parse `HH:MM:SS.frac` into seconds.
pub fn parse_timestamp_secs(s: &str) -> Option<f64> {
    let mut parts = s.trim().split(':');
    let h = parts.next()?.parse::<u64>().ok()?;
    let m = parts.next()?.parse::<u64>().ok()?;
    let sec = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || m >= 60 || !(0.0..60.0).contains(&sec) {
        return None;
    }
    Some((h * 3600 + m * 60) as f64 + sec)
}

/// Extract the input duration from a log line such as
/// `  Duration: 00:00:02.02, start: 0.000000, bitrate: 12 kb/s`.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once("Duration: ")?;
    let value = rest.split(',').next()?;
    let secs = parse_timestamp_secs(value)?;
    (secs > 0.0).then_some(secs)
}

/// One recognized line of `-progress` output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressLine {
    /// Output position in microseconds.
    OutTimeUs(u64),
    Continue,
    End,
}

pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports `out_time_ms` in microseconds as well.
        "out_time_us" | "out_time_ms" => value.parse::<u64>().ok().map(ProgressLine::OutTimeUs),
        "progress" => match value {
            "end" => Some(ProgressLine::End),
            "continue" => Some(ProgressLine::Continue),
            _ => None,
        },
        _ => None,
    }
}

/// Bounded buffer of the most recent log lines, used for error messages.
#[derive(Clone, Debug)]
pub struct LogTail {
    lines: VecDeque<String>,
    cap: usize,
}

impl LogTail {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn joined(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
