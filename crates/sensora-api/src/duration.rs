// ── Relative-time duration grammar ──
//
// Historical-data requests carry a compact duration string such as
// `"-15m30s"`. The server interprets it; the client only validates it
// locally before any traffic is sent.
//
// Grammar: `duration := "-"? unit_term+`, `unit_term := magnitude unit`,
// `unit ∈ {h, m, s, ms, µs, us, ns}`. Magnitudes are decimals.

use crate::error::Error;

/// Per-unit breakdown of a parsed duration string.
///
/// Values are kept per unit rather than collapsed into one quantity:
/// the wire format repeats the original string, so this type exists
/// for validation and for callers that want to display the request
/// window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationSpec {
    pub hours: f64,
    pub minutes: f64,
    pub seconds: f64,
    pub millis: f64,
    pub micros: f64,
    pub nanos: f64,
}

/// Multi-character units first so `"ms"` is not read as `m` + trailing `s`.
const UNITS: [&str; 7] = ["ms", "µs", "us", "ns", "h", "m", "s"];

/// Parse and validate a duration string.
///
/// The whole input must be consumed; trailing garbage, a missing unit,
/// or an empty magnitude all fail with [`Error::InvalidDuration`].
/// A leading `-` negates every term.
pub fn parse(input: &str) -> Result<DurationSpec, Error> {
    let mut rest = input;
    let negative = match rest.strip_prefix('-') {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };

    if rest.is_empty() {
        return Err(invalid(input, "expected at least one magnitude+unit term"));
    }

    let mut spec = DurationSpec::default();

    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (magnitude, after) = rest.split_at(split);

        if magnitude.is_empty() {
            return Err(invalid(input, "expected a decimal magnitude"));
        }
        let value: f64 = magnitude
            .parse()
            .map_err(|_| invalid(input, "malformed decimal magnitude"))?;

        let Some((unit, after_unit)) = match_unit(after) else {
            return Err(invalid(input, "expected a unit (h, m, s, ms, µs, us, ns)"));
        };

        match unit {
            "h" => spec.hours += value,
            "m" => spec.minutes += value,
            "s" => spec.seconds += value,
            "ms" => spec.millis += value,
            "µs" | "us" => spec.micros += value,
            "ns" => spec.nanos += value,
            _ => unreachable!("match_unit only yields known units"),
        }

        rest = after_unit;
    }

    if negative {
        spec.hours = -spec.hours;
        spec.minutes = -spec.minutes;
        spec.seconds = -spec.seconds;
        spec.millis = -spec.millis;
        spec.micros = -spec.micros;
        spec.nanos = -spec.nanos;
    }

    Ok(spec)
}

/// Longest-match a unit at the start of `rest`.
fn match_unit(rest: &str) -> Option<(&'static str, &str)> {
    UNITS
        .iter()
        .find_map(|unit| rest.strip_prefix(unit).map(|after| (*unit, after)))
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
