use chrono::Utc;
use log::trace;
use probe_models::ping::{PacketStats, PingResult, PingSample, TimingStats};
use probe_models::probe_response::StreamEvent;
use probe_models::trace::{HopRecord, TracerouteResult};

use crate::parse::{Fragment, PacketCounts, ParsedHop};

/// Folds the fragments of one probe run into its final result.
pub trait Assembler: Send {
    type Output;

    /// Takes in one parsed line. Returns the progress event to stream for it, if any.
    fn accept(&mut self, raw: &str, fragment: Fragment) -> Option<StreamEvent>;

    /// Stamps the result. Nothing is filled in for output that never arrived.
    fn finish(self) -> Self::Output;
}

#[derive(Debug)]
pub struct PingAssembler {
    host: String,
    responses: Vec<PingSample>,
    packets: PacketCounts,
    timing: TimingStats,
}

impl PingAssembler {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            responses: vec![],
            packets: PacketCounts::default(),
            timing: TimingStats::default(),
        }
    }
}

impl Assembler for PingAssembler {
    type Output = PingResult;

    fn accept(&mut self, raw: &str, fragment: Fragment) -> Option<StreamEvent> {
        match fragment {
            Fragment::Sample { latency_ms } => {
                let sample = PingSample {
                    sequence: self.responses.len() as u32 + 1,
                    latency_ms,
                    raw: raw.to_string(),
                };
                self.responses.push(sample.clone());
                Some(StreamEvent::Sample { data: sample })
            }
            Fragment::Packets(counts) => {
                self.packets = PacketCounts {
                    transmitted: counts.transmitted.or(self.packets.transmitted),
                    received: counts.received.or(self.packets.received),
                    loss_percent: counts.loss_percent.or(self.packets.loss_percent),
                };
                None
            }
            Fragment::Timing(timing) => {
                self.timing = TimingStats {
                    min: timing.min.or(self.timing.min),
                    avg: timing.avg.or(self.timing.avg),
                    max: timing.max.or(self.timing.max),
                    mdev: timing.mdev.or(self.timing.mdev),
                };
                None
            }
            Fragment::Hop(_) => {
                trace!("Ignoring hop-like line in ping output: {}", raw);
                None
            }
        }
    }

    fn finish(self) -> PingResult {
        let packets = PacketStats::new(
            self.packets.transmitted.unwrap_or_default(),
            self.packets.received.unwrap_or_default(),
            self.packets.loss_percent.unwrap_or_default(),
        );
        PingResult {
            host: self.host,
            packets,
            timing: self.timing,
            responses: self.responses,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct TraceAssembler {
    host: String,
    hops: Vec<HopRecord>,
}

impl TraceAssembler {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            hops: vec![],
        }
    }
}

impl Assembler for TraceAssembler {
    type Output = TracerouteResult;

    fn accept(&mut self, raw: &str, fragment: Fragment) -> Option<StreamEvent> {
        let Fragment::Hop(ParsedHop {
            hop,
            ip,
            hostname,
            times,
        }) = fragment
        else {
            trace!("Ignoring non-hop line in traceroute output: {}", raw);
            return None;
        };
        let record = HopRecord {
            hop,
            ip,
            hostname,
            times,
            raw: raw.trim().to_string(),
            timestamp: Utc::now(),
        };
        self.hops.push(record.clone());
        Some(StreamEvent::Hop { data: record })
    }

    fn finish(self) -> TracerouteResult {
        TracerouteResult {
            host: self.host,
            hops: self.hops,
            timestamp: Utc::now(),
        }
    }
}
