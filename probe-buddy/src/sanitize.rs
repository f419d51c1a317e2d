use probe_models::probe_request::RawBound;
use probe_models::ProbeKind;

use crate::error::ProbeError;

/// Longest name DNS can represent, see RFC 1035.
const MAX_HOST_LEN: usize = 253;

/// Removes every character except ASCII letters, digits, dots and hyphens.
///
/// The host still ends up as a single argv element, never inside a shell string, so this is
/// not the only thing standing between user input and the command line.
pub fn sanitize_host(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect()
}

/// Clamps a count/hop limit to `[1, max]`. Anything that isn't an integer means `max`.
pub fn sanitize_bound(raw: Option<&RawBound>, max: u32) -> u32 {
    let max = max.max(1);
    match raw.and_then(RawBound::as_integer) {
        Some(value) => value.clamp(1, max as i64) as u32,
        None => max,
    }
}

/// A sanitised request, ready to be turned into a process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub kind: ProbeKind,
    pub host: String,
    /// Echo count for ping, maximum hops for traceroute.
    pub bound: u32,
}

impl ProbeRequest {
    pub fn new(
        kind: ProbeKind,
        raw_host: &str,
        raw_bound: Option<&RawBound>,
        max: u32,
    ) -> Result<Self, ProbeError> {
        let req = Self {
            kind,
            host: sanitize_host(raw_host),
            bound: sanitize_bound(raw_bound, max),
        };
        req.check(max)?;
        Ok(req)
    }

    /// Re-checks what sanitisation should already guarantee, plus what it cannot: a host that
    /// is empty, overly long, or would be read as an option by the probe binary.
    fn check(&self, max: u32) -> Result<(), ProbeError> {
        if self.host.is_empty() {
            return Err(ProbeError::invalid_input("host is empty after sanitisation"));
        }
        if self.host.len() > MAX_HOST_LEN {
            return Err(ProbeError::invalid_input(format!(
                "host is longer than {} characters",
                MAX_HOST_LEN
            )));
        }
        if self.host.starts_with('-') {
            return Err(ProbeError::invalid_input(format!(
                "host `{}` would be interpreted as an option",
                self.host
            )));
        }
        if self.bound < 1 || self.bound > max.max(1) {
            return Err(ProbeError::invalid_input(format!(
                "{} bound {} outside of [1, {}]",
                self.kind, self.bound, max
            )));
        }
        Ok(())
    }

    /// Deterministic cache key: operation, case-folded host and bound.
    pub fn fingerprint(&self) -> String {
        format!("{}_{}_{}", self.kind, self.host.to_ascii_lowercase(), self.bound)
    }
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    fn int(value: i64) -> RawBound {
        RawBound::Integer(value)
    }

    #[test]
    fn host_keeps_only_whitelisted_chars() {
        assert_that!(sanitize_host("exa mple.com; rm -rf /"))
            .is_equal_to("example.comrm-rf".to_string());
        assert_that!(sanitize_host("10.0.0.1")).is_equal_to("10.0.0.1".to_string());
        assert_that!(sanitize_host("hôst_name.de")).is_equal_to("hstname.de".to_string());
        assert_that!(sanitize_host("$(reboot)")).is_equal_to("reboot".to_string());
    }

    #[test]
    fn bound_is_clamped() {
        assert_that!(sanitize_bound(Some(&int(0)), 4)).is_equal_to(1);
        assert_that!(sanitize_bound(Some(&int(-10)), 4)).is_equal_to(1);
        assert_that!(sanitize_bound(Some(&int(3)), 4)).is_equal_to(3);
        assert_that!(sanitize_bound(Some(&int(99)), 30)).is_equal_to(30);
    }

    #[test]
    fn bound_defaults_to_max() {
        assert_that!(sanitize_bound(None, 4)).is_equal_to(4);
        assert_that!(sanitize_bound(Some(&RawBound::Text("lots".to_string())), 30)).is_equal_to(30);
        assert_that!(sanitize_bound(Some(&RawBound::Text("2".to_string())), 30)).is_equal_to(2);
        assert_that!(sanitize_bound(Some(&RawBound::Text("3abc".to_string())), 30))
            .is_equal_to(3);
    }

    #[test]
    fn request_with_only_garbage_host_is_invalid() {
        // when
        let res = ProbeRequest::new(ProbeKind::Ping, "!!! ///", None, 4);

        // then
        assert!(matches!(res, Err(ProbeError::InvalidInput { .. })));
    }

    #[test]
    fn request_with_option_like_host_is_invalid() {
        let res = ProbeRequest::new(ProbeKind::Traceroute, "-f", Some(&int(3)), 30);
        assert!(matches!(res, Err(ProbeError::InvalidInput { .. })));
    }

    #[test]
    fn fingerprint_is_case_insensitive_on_host() -> Result<(), ProbeError> {
        // given
        let upper = ProbeRequest::new(ProbeKind::Traceroute, "Example.COM", Some(&int(12)), 30)?;
        let lower = ProbeRequest::new(ProbeKind::Traceroute, "example.com", Some(&int(12)), 30)?;

        // when
        let key = upper.fingerprint();

        // then
        assert_that!(key).is_equal_to("traceroute_example.com_12".to_string());
        assert_that!(lower.fingerprint()).is_equal_to(upper.fingerprint());
        Ok(())
    }

    #[test]
    fn fingerprint_differs_by_kind_and_bound() -> Result<(), ProbeError> {
        let ping = ProbeRequest::new(ProbeKind::Ping, "example.com", Some(&int(4)), 4)?;
        let fewer = ProbeRequest::new(ProbeKind::Ping, "example.com", Some(&int(2)), 4)?;
        let trace = ProbeRequest::new(ProbeKind::Traceroute, "example.com", Some(&int(4)), 30)?;
        assert_that!(ping.fingerprint()).is_equal_to("ping_example.com_4".to_string());
        assert_that!(ping.fingerprint()).is_not_equal_to(fewer.fingerprint());
        assert_that!(ping.fingerprint()).is_not_equal_to(trace.fingerprint());
        Ok(())
    }
}
