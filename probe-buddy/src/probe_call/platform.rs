use std::fmt;
use std::time::Duration;

use itertools::Itertools;
use probe_models::ProbeKind;

use crate::sanitize::ProbeRequest;

use super::MAX_TIMEOUT;

/// Traceroute is given this many times the base timeout, since it waits on every hop.
const TRACEROUTE_TIMEOUT_FACTOR: u32 = 3;

/// The command line conventions of the operating system we run on. Chosen once at startup,
/// so that nothing else needs to care about which OS it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Unix {
        ping_bin: String,
        traceroute_bin: String,
    },
    Windows {
        ping_bin: String,
        tracert_bin: String,
    },
}

impl Platform {
    pub fn unix(ping_bin: &str, traceroute_bin: &str) -> Self {
        Self::Unix {
            ping_bin: ping_bin.to_string(),
            traceroute_bin: traceroute_bin.to_string(),
        }
    }

    pub fn windows(ping_bin: &str, tracert_bin: &str) -> Self {
        Self::Windows {
            ping_bin: ping_bin.to_string(),
            tracert_bin: tracert_bin.to_string(),
        }
    }

    /// Builds the argv for a request. The host is always its own, final argument.
    pub fn invocation(&self, req: &ProbeRequest, base_timeout: Duration) -> Invocation {
        let bound = req.bound.to_string();
        let (program, flag) = match (self, req.kind) {
            (Platform::Unix { ping_bin, .. }, ProbeKind::Ping) => (ping_bin, "-c"),
            (Platform::Unix { traceroute_bin, .. }, ProbeKind::Traceroute) => {
                (traceroute_bin, "-m")
            }
            (Platform::Windows { ping_bin, .. }, ProbeKind::Ping) => (ping_bin, "-n"),
            (Platform::Windows { tracert_bin, .. }, ProbeKind::Traceroute) => (tracert_bin, "-h"),
        };
        let timeout = match req.kind {
            ProbeKind::Ping => base_timeout,
            ProbeKind::Traceroute => base_timeout.saturating_mul(TRACEROUTE_TIMEOUT_FACTOR),
        }
        .min(MAX_TIMEOUT);
        Invocation {
            program: program.to_string(),
            args: vec![flag.to_string(), bound, req.host.clone()],
            timeout,
        }
    }
}

/// Everything needed to run one probe process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Wall-clock limit, after which the process is killed.
    pub timeout: Duration,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.iter().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    fn req(kind: ProbeKind, bound: u32) -> ProbeRequest {
        ProbeRequest {
            kind,
            host: "example.com".to_string(),
            bound,
        }
    }

    #[test]
    fn unix_ping() {
        // given
        let platform = Platform::unix("ping", "traceroute");

        // when
        let inv = platform.invocation(&req(ProbeKind::Ping, 4), Duration::from_secs(30));

        // then
        assert_that!(inv.program).is_equal_to("ping".to_string());
        assert_that!(inv.args).is_equal_to(vec![
            "-c".to_string(),
            "4".to_string(),
            "example.com".to_string(),
        ]);
        assert_that!(inv.timeout).is_equal_to(Duration::from_secs(30));
    }

    #[test]
    fn unix_traceroute_gets_triple_timeout() {
        let platform = Platform::unix("/usr/bin/ping", "/usr/sbin/traceroute");
        let inv = platform.invocation(&req(ProbeKind::Traceroute, 30), Duration::from_secs(30));
        assert_that!(inv.to_string())
            .is_equal_to("/usr/sbin/traceroute -m 30 example.com".to_string());
        assert_that!(inv.timeout).is_equal_to(Duration::from_secs(90));
    }

    #[test]
    fn windows_flags() {
        let platform = Platform::windows("ping", "tracert");
        let ping = platform.invocation(&req(ProbeKind::Ping, 2), Duration::from_millis(500));
        let trace =
            platform.invocation(&req(ProbeKind::Traceroute, 12), Duration::from_millis(500));
        assert_that!(ping.to_string()).is_equal_to("ping -n 2 example.com".to_string());
        assert_that!(trace.to_string()).is_equal_to("tracert -h 12 example.com".to_string());
        assert_that!(trace.timeout).is_equal_to(Duration::from_millis(1500));
    }

    #[test]
    fn huge_timeouts_are_capped() {
        let platform = Platform::unix("ping", "traceroute");
        let ping = platform.invocation(&req(ProbeKind::Ping, 4), Duration::MAX);
        let trace = platform.invocation(&req(ProbeKind::Traceroute, 30), Duration::MAX);
        assert_that!(ping.timeout).is_equal_to(MAX_TIMEOUT);
        assert_that!(trace.timeout).is_equal_to(MAX_TIMEOUT);
    }
}
