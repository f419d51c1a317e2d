use probe_models::ping::TimingStats;

pub use self::ping::PingParser;
pub use self::traceroute::TracerouteParser;

mod ping;
mod traceroute;

/// Output grammar of one kind of probe.
pub trait LineParser: Send + Sync {
    /// Yields at most one fragment per line, `None` for lines that carry nothing of interest.
    fn parse(&self, line: &str) -> Option<Fragment>;
}

/// What a single line of probe output turned out to be. Lines that are none of these (banners,
/// blank lines, localised chatter) produce no fragment at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// One echo reply.
    Sample { latency_ms: f64 },
    Packets(PacketCounts),
    Timing(TimingStats),
    Hop(ParsedHop),
}

/// Packet summary as printed. Fields are `None` where the number could not be read, so that the
/// assembler keeps whatever it had before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounts {
    pub transmitted: Option<u32>,
    pub received: Option<u32>,
    pub loss_percent: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedHop {
    pub hop: u32,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub times: Vec<f64>,
}

impl ParsedHop {
    /// Keeps a hostname only if it says something the IP doesn't.
    fn with_host(mut self, hostname: Option<&str>, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self.hostname = hostname.filter(|name| Some(*name) != ip).map(str::to_string);
        self
    }
}

fn parse_opt<T: std::str::FromStr>(value: Option<regex::Match>) -> Option<T> {
    value.and_then(|m| m.as_str().trim().parse().ok())
}
