use std::iter::Peekable;
use std::net::IpAddr;

use regex::Regex;

use super::{Fragment, LineParser, ParsedHop};

/// Understands hop lines of Unix `traceroute` and Windows `tracert`. Both grammars are tried on
/// every line, Unix first, which keeps the parser independent of the platform we run on.
#[derive(Debug)]
pub struct TracerouteParser {
    unix_hop: Regex,
    windows_hop: Regex,
    windows_named: Regex,
}

impl TracerouteParser {
    pub fn new() -> Result<Self, regex::Error> {
        const SLOT: &str = r"(\*|<?\d+(?:\.\d+)?\s*ms)";
        Ok(Self {
            unix_hop: Regex::new(r"^\s*(\d+)\s+(\S.*?)\s*$")?,
            windows_hop: Regex::new(&format!(
                r"^\s*(\d+)\s+{SLOT}\s+{SLOT}\s+{SLOT}(?:\s+(.*?))?\s*$"
            ))?,
            windows_named: Regex::new(r"^(\S+)\s+\[([^\]]+)\]$")?,
        })
    }

    /// `<hop>  <name> (<ip>)  <rtt> ms ...`, where probes of the same hop may be answered by
    /// different routers. The first router named is the one reported, anything the parser doesn't
    /// know after it (AS numbers, messages) is ignored.
    fn parse_unix(&self, line: &str) -> Option<ParsedHop> {
        let caps = self.unix_hop.captures(line)?;
        let hop = caps.get(1)?.as_str().parse().ok()?;
        let mut tokens = caps.get(2)?.as_str().split_whitespace().peekable();

        let mut parsed = ParsedHop {
            hop,
            ..Default::default()
        };
        let mut host_seen = false;
        let mut first = true;
        while let Some(token) = tokens.next() {
            let is_first = std::mem::take(&mut first);
            if is_first && token.starts_with('<') {
                // `<1 ms`, only tracert prints those
                return None;
            }
            if token == "*" {
                continue;
            }
            if let Some(latency) = parse_latency(token, &mut tokens) {
                if is_first {
                    // that's a Windows line
                    return None;
                }
                parsed.times.push(latency);
                continue;
            }
            if token.starts_with('!') {
                // annotations like !H, !N or !X<n>
                continue;
            }

            let in_parens = tokens
                .peek()
                .and_then(|next| next.strip_prefix('(')?.strip_suffix(')'))
                .map(str::to_string);
            let (name, ip) = match in_parens {
                Some(ip) => {
                    tokens.next();
                    let ip = if is_ip(&ip) { Some(ip) } else { None };
                    (Some(token), ip)
                }
                None if is_ip(token) => (None, Some(token.to_string())),
                None if host_seen => continue,
                // a word after three stars may be a tracert message or `name [ip]`
                None if !is_first && self.windows_hop.is_match(line) => return None,
                None => (Some(token), None),
            };
            if !host_seen {
                host_seen = true;
                parsed = parsed.with_host(name, ip.as_deref());
            }
        }
        Some(parsed)
    }

    /// `<hop>  <t1>  <t2>  <t3>  <name> [<ip>]`, each slot a time or `*`.
    fn parse_windows(&self, line: &str) -> Option<ParsedHop> {
        let caps = self.windows_hop.captures(line)?;
        let hop = caps.get(1)?.as_str().parse().ok()?;
        let times = (2..=4)
            .filter_map(|i| caps.get(i))
            .filter_map(|slot| parse_slot(slot.as_str()))
            .collect();
        let parsed = ParsedHop {
            hop,
            times,
            ..Default::default()
        };

        let tail = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
        if let Some(named) = self.windows_named.captures(tail) {
            let name = named.get(1).map(|m| m.as_str());
            let ip = named.get(2).map(|m| m.as_str());
            return Some(parsed.with_host(name, ip));
        }
        if tail.is_empty() || tail.contains(char::is_whitespace) {
            // e.g. "Request timed out."
            return Some(parsed);
        }
        if is_ip(tail) {
            Some(parsed.with_host(None, Some(tail)))
        } else {
            Some(parsed.with_host(Some(tail), None))
        }
    }
}

impl LineParser for TracerouteParser {
    fn parse(&self, line: &str) -> Option<Fragment> {
        self.parse_unix(line)
            .or_else(|| self.parse_windows(line))
            .map(Fragment::Hop)
    }
}

/// Reads `12.3 ms` (two tokens, consuming the unit) or `12.3ms`.
fn parse_latency<'a>(
    token: &str,
    rest: &mut Peekable<impl Iterator<Item = &'a str>>,
) -> Option<f64> {
    if let Some(number) = token.strip_suffix("ms") {
        return parse_number(number);
    }
    let value = parse_number(token)?;
    if rest.peek() == Some(&"ms") {
        rest.next();
        Some(value)
    } else {
        None
    }
}

fn parse_slot(slot: &str) -> Option<f64> {
    if slot == "*" {
        return None;
    }
    let number = slot.trim_end_matches("ms").trim();
    match number.strip_prefix('<') {
        Some(bound) => parse_number(bound).map(|value| value.max(1.0)),
        None => parse_number(number),
    }
}

/// Plain decimal only, `f64::from_str` would also take e.g. `inf`.
fn parse_number(token: &str) -> Option<f64> {
    let plain = !token.is_empty() && token.chars().all(|c| c.is_ascii_digit() || c == '.');
    if plain {
        token.parse().ok()
    } else {
        None
    }
}

fn is_ip(token: &str) -> bool {
    token.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    fn parse(line: &str) -> Option<ParsedHop> {
        let parser = TracerouteParser::new().expect("valid patterns");
        match parser.parse(line) {
            Some(Fragment::Hop(hop)) => Some(hop),
            Some(other) => panic!("unexpected fragment {:?}", other),
            None => None,
        }
    }

    fn hop(
        hop: u32,
        ip: Option<&str>,
        hostname: Option<&str>,
        times: Vec<f64>,
    ) -> Option<ParsedHop> {
        Some(ParsedHop {
            hop,
            ip: ip.map(str::to_string),
            hostname: hostname.map(str::to_string),
            times,
        })
    }

    #[test]
    fn windows_named_hop() {
        // when
        let parsed = parse("3    12 ms    <1 ms    11 ms  router.example.com [10.0.0.1]");

        // then
        assert_that!(parsed).is_equal_to(hop(
            3,
            Some("10.0.0.1"),
            Some("router.example.com"),
            vec![12.0, 1.0, 11.0],
        ));
    }

    #[test]
    fn unix_unanswered_hop() {
        assert_that!(parse("5  * * *")).is_equal_to(hop(5, None, None, vec![]));
    }

    #[test]
    fn unix_named_hop() {
        let parsed = parse(" 1  gateway (192.168.1.1)  0.512 ms  0.480 ms  0.455 ms");
        assert_that!(parsed).is_equal_to(hop(
            1,
            Some("192.168.1.1"),
            Some("gateway"),
            vec![0.512, 0.480, 0.455],
        ));
    }

    #[test]
    fn unix_numeric_hop_with_partial_answers() {
        assert_that!(parse(" 7  10.20.30.40  8.1 ms *  9.0 ms")).is_equal_to(hop(
            7,
            Some("10.20.30.40"),
            None,
            vec![8.1, 9.0],
        ));
    }

    #[test]
    fn unix_hop_answered_by_several_routers_reports_first() {
        // given
        let line = " 4  a.example.net (10.0.0.4)  3.1 ms b.example.net (10.0.0.5)  3.4 ms  3.2 ms";

        // when
        let parsed = parse(line);

        // then
        assert_that!(parsed).is_equal_to(hop(
            4,
            Some("10.0.0.4"),
            Some("a.example.net"),
            vec![3.1, 3.4, 3.2],
        ));
    }

    #[test]
    fn unix_unresolved_name_equal_to_ip_is_dropped() {
        assert_that!(parse(" 2  10.0.0.2 (10.0.0.2)  1.204 ms !H  1.1 ms !H")).is_equal_to(hop(
            2,
            Some("10.0.0.2"),
            None,
            vec![1.204, 1.1],
        ));
    }

    #[test]
    fn unix_hostname_without_ip() {
        assert_that!(parse(" 9  edge.example.net  20.5 ms")).is_equal_to(hop(
            9,
            None,
            Some("edge.example.net"),
            vec![20.5],
        ));
    }

    #[test]
    fn unix_hostname_outside_ascii() {
        assert_that!(parse(" 4  rôuter.example  5.0 ms")).is_equal_to(hop(
            4,
            None,
            Some("rôuter.example"),
            vec![5.0],
        ));
    }

    #[test]
    fn unix_hostname_with_unusual_characters() {
        assert_that!(parse(" 4  a+b.example (10.0.0.4)  5.0 ms")).is_equal_to(hop(
            4,
            Some("10.0.0.4"),
            Some("a+b.example"),
            vec![5.0],
        ));
    }

    #[test]
    fn unix_trailing_as_number_is_ignored() {
        // given
        let line = " 4  router.example (10.0.0.4) [AS15169]  5.0 ms  5.5 ms";

        // when
        let parsed = parse(line);

        // then
        assert_that!(parsed).is_equal_to(hop(
            4,
            Some("10.0.0.4"),
            Some("router.example"),
            vec![5.0, 5.5],
        ));
    }

    #[test]
    fn parenthesised_garbage_keeps_the_name() {
        assert_that!(parse(" 6  router.example (unknown)  7.0 ms")).is_equal_to(hop(
            6,
            None,
            Some("router.example"),
            vec![7.0],
        ));
    }

    #[test]
    fn unreachable_report_keeps_the_hop() {
        let parsed = parse("  5  10.0.0.1  reports: Destination host unreachable.");
        assert_that!(parsed).is_equal_to(hop(
            5,
            Some("10.0.0.1"),
            None,
            vec![],
        ));
    }

    #[test]
    fn unix_hostname_after_unanswered_probes() {
        assert_that!(parse(" 3  *  edge.example.net  4.2 ms")).is_equal_to(hop(
            3,
            None,
            Some("edge.example.net"),
            vec![4.2],
        ));
    }

    #[test]
    fn windows_partial_answers_with_name() {
        let parsed = parse("  2     *        5 ms     *     router.example [10.0.0.2]");
        assert_that!(parsed).is_equal_to(hop(
            2,
            Some("10.0.0.2"),
            Some("router.example"),
            vec![5.0],
        ));
    }

    #[test]
    fn unix_ipv6_hop() {
        assert_that!(parse(" 3  2001:db8::1  4.0 ms  4.1 ms  4.2 ms")).is_equal_to(hop(
            3,
            Some("2001:db8::1"),
            None,
            vec![4.0, 4.1, 4.2],
        ));
    }

    #[test]
    fn windows_timeout_hop() {
        let parsed = parse("  6     *        *        *     Request timed out.");
        assert_that!(parsed).is_equal_to(hop(6, None, None, vec![]));
    }

    #[test]
    fn windows_numeric_hop() {
        assert_that!(parse("  1    <1 ms    <1 ms    <1 ms  192.168.1.1")).is_equal_to(hop(
            1,
            Some("192.168.1.1"),
            None,
            vec![1.0, 1.0, 1.0],
        ));
    }

    #[test]
    fn windows_hostname_that_looks_like_ip_is_kept() {
        let parsed = parse("  8    30 ms    31 ms    29 ms  10.0.0.8.in-addr.example [10.0.0.8]");
        assert_that!(parsed).is_equal_to(hop(
            8,
            Some("10.0.0.8"),
            Some("10.0.0.8.in-addr.example"),
            vec![30.0, 31.0, 29.0],
        ));
    }

    #[test]
    fn banners_are_skipped() {
        let banner = "traceroute to example.com (93.184.216.34), 30 hops max, 60 byte packets";
        assert_that!(parse(banner)).is_none();
        assert_that!(parse("Tracing route to example.com [93.184.216.34]")).is_none();
        assert_that!(parse("over a maximum of 30 hops:")).is_none();
        assert_that!(parse("Trace complete.")).is_none();
        assert_that!(parse("")).is_none();
    }
}
