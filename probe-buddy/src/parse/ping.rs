use probe_models::ping::TimingStats;
use regex::{Captures, Regex};

use super::{parse_opt, Fragment, LineParser, PacketCounts};

/// Understands the output of Linux iputils, BSD/macOS and Windows ping.
#[derive(Debug)]
pub struct PingParser {
    sample: Regex,
    packets_unix: Regex,
    packets_windows: Regex,
    timing_unix: Regex,
    timing_windows: Regex,
}

impl PingParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // Windows prints `time<1ms` for sub-millisecond replies
            sample: Regex::new(r"(?i)\btime\s*([=<])\s*(\d+(?:\.\d+)?)")?,
            packets_unix: Regex::new(
                r"(?i)(\d+)\s+packets?\s+transmitted,\s*(\d+)\s+(?:packets\s+)?received,.*?([\d.]+)%\s+packet\s+loss",
            )?,
            packets_windows: Regex::new(
                r"(?i)Sent\s*=\s*(\d+),\s*Received\s*=\s*(\d+),\s*Lost\s*=\s*\d+\s*\(([\d.]+)%\s*loss\)",
            )?,
            timing_unix: Regex::new(
                r"(?i)(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*([^/\s]+)/([^/\s]+)/([^/\s]+)/([^/\s]+)",
            )?,
            timing_windows: Regex::new(
                r"(?i)Minimum\s*=\s*([\d.]+)\s*ms,\s*Maximum\s*=\s*([\d.]+)\s*ms,\s*Average\s*=\s*([\d.]+)\s*ms",
            )?,
        })
    }
}

impl LineParser for PingParser {
    fn parse(&self, line: &str) -> Option<Fragment> {
        if let Some(caps) = self.sample.captures(line) {
            return sample_of(&caps);
        }
        if let Some(caps) = self
            .packets_unix
            .captures(line)
            .or_else(|| self.packets_windows.captures(line))
        {
            return Some(Fragment::Packets(packets_of(&caps)));
        }
        if let Some(caps) = self.timing_unix.captures(line) {
            return Some(Fragment::Timing(TimingStats {
                min: parse_opt(caps.get(1)),
                avg: parse_opt(caps.get(2)),
                max: parse_opt(caps.get(3)),
                mdev: parse_opt(caps.get(4)),
            }));
        }
        if let Some(caps) = self.timing_windows.captures(line) {
            return Some(Fragment::Timing(TimingStats {
                min: parse_opt(caps.get(1)),
                max: parse_opt(caps.get(2)),
                avg: parse_opt(caps.get(3)),
                mdev: None,
            }));
        }
        None
    }
}

fn sample_of(caps: &Captures) -> Option<Fragment> {
    let latency_ms: f64 = parse_opt(caps.get(2))?;
    let latency_ms = match caps.get(1).map(|m| m.as_str()) {
        Some("<") => latency_ms.max(1.0),
        _ => latency_ms,
    };
    Some(Fragment::Sample { latency_ms })
}

fn packets_of(caps: &Captures) -> PacketCounts {
    let loss_percent: Option<f64> = parse_opt(caps.get(3));
    PacketCounts {
        transmitted: parse_opt(caps.get(1)),
        received: parse_opt(caps.get(2)),
        loss_percent: loss_percent.map(|pct| pct.round().clamp(0.0, 100.0) as u32),
    }
}
