use serde::{Deserialize, Serialize};

use crate::ProbeKind;

/// A probe request as received from a front end, before any sanitisation. Field names follow
/// the browser-facing API (`maxHops`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequestMessage {
    /// Opaque correlation id, echoed back on every event for this request.
    #[serde(default)]
    pub id: Option<String>,
    pub kind: ProbeKind,
    pub host: String,
    #[serde(default)]
    pub count: Option<RawBound>,
    #[serde(default)]
    pub max_hops: Option<RawBound>,
    /// Whether progress events (samples/hops) are wanted, or only the final result.
    #[serde(default)]
    pub stream: bool,
}

impl ProbeRequestMessage {
    /// The bound that applies to this request's kind: `count` for ping, `maxHops` for traceroute.
    pub fn bound(&self) -> Option<&RawBound> {
        match self.kind {
            ProbeKind::Ping => self.count.as_ref(),
            ProbeKind::Traceroute => self.max_hops.as_ref(),
        }
    }
}

/// Browsers send numbers as either JSON numbers or strings, depending on where they come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBound {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawBound {
    /// Integer interpretation of the raw value, truncating fractions. Text is read up to the first
    /// character that isn't a digit, so `"3abc"` is 3. `None` if there are no digits at all.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(it) => Some(*it),
            Self::Float(it) => truncate(*it),
            Self::Text(text) => leading_integer(text),
        }
    }
}

fn leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let unsigned = trimmed.trim_start_matches(&['+', '-'][..]);
    let sign_len = trimmed.len() - unsigned.len();
    if sign_len > 1 {
        return None;
    }
    let digits_len = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits_len == 0 {
        return None;
    }
    let number = &trimmed[..sign_len + digits_len];
    // too many digits for an i64 is still a huge bound
    match number.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if number.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

fn truncate(value: f64) -> Option<i64> {
    if value.is_finite() {
        Some(value.trunc() as i64)
    } else {
        None
    }
}
