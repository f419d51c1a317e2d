use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line of traceroute output that could be understood as a hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopRecord {
    /// 1-based, as printed by the binary. Repeated numbers are kept as-is.
    pub hop: u32,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    /// Round-trip times in milliseconds. Empty means no probe of this hop was answered.
    pub times: Vec<f64>,
    pub raw: String,
    pub timestamp: DateTime<Utc>,
}

impl HopRecord {
    pub fn is_unanswered(&self) -> bool {
        self.ip.is_none() && self.hostname.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteResult {
    pub host: String,
    /// Line order of the output, which is ascending by hop unless the binary retried a hop.
    pub hops: Vec<HopRecord>,
    pub timestamp: DateTime<Utc>,
}
