use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One echo reply, in the order the ping binary printed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingSample {
    /// 1-based arrival index. Sequence numbers printed by the binary are not trusted since
    /// Windows doesn't print any.
    pub sequence: u32,
    pub latency_ms: f64,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketStats {
    pub transmitted: u32,
    pub received: u32,
    /// Always `transmitted - received`, use [PacketStats::new] to construct. Negative if the
    /// binary counted duplicate replies as received.
    pub lost: i64,
    pub loss_percent: u32,
}

impl PacketStats {
    pub fn new(transmitted: u32, received: u32, loss_percent: u32) -> Self {
        Self {
            transmitted,
            received,
            lost: i64::from(transmitted) - i64::from(received),
            loss_percent,
        }
    }
}

/// Round-trip summary. All-`None` is a normal outcome, e.g. if nothing answered or the process
/// was killed before printing its summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub mdev: Option<f64>,
}

impl TimingStats {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.avg.is_none() && self.max.is_none() && self.mdev.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub host: String,
    pub packets: PacketStats,
    pub timing: TimingStats,
    pub responses: Vec<PingSample>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    #[test]
    fn lost_is_the_difference() {
        assert_that!(PacketStats::new(4, 1, 75).lost).is_equal_to(3);
    }

    #[test]
    fn lost_goes_negative_with_duplicates() {
        // given
        let stats = PacketStats::new(4, 5, 0);

        // then
        assert_that!(stats.lost).is_equal_to(-1);
        let difference = i64::from(stats.transmitted) - i64::from(stats.received);
        assert_that!(stats.lost).is_equal_to(difference);
    }
}
