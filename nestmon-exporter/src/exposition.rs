//! Rendering of gauge metrics in the Prometheus text exposition format.
//!
//! Every metric is emitted as a three-line block:
//!
//! ```text
//! # HELP <name> <help>
//! # TYPE <name> gauge
//! <name> <value>
//! ```
//!
//! Blocks are joined with a single `\n` and the output has no trailing newline.

use chrono::TimeDelta;

/// The only metric type this exporter emits.
pub const GAUGE: &str = "gauge";

/// Value of a gauge, tagged with how it is encoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GaugeValue {
    /// Whole number, rendered without a fractional part.
    Integer(i64),
    /// Rendered as `1` or `0`.
    Boolean(bool),
    /// Floating value, rendered in shortest round-trip form.
    Float(f64),
    /// Elapsed time in seconds, rendered as a floating value.
    Seconds(f64),
}

impl GaugeValue {
    /// Elapsed seconds from a signed time delta, with millisecond precision.
    pub fn elapsed(delta: TimeDelta) -> Self {
        GaugeValue::Seconds(delta.num_milliseconds() as f64 / 1000.0)
    }

    /// Render the value for the sample line.
    pub fn render(&self) -> String {
        match self {
            GaugeValue::Integer(v) => v.to_string(),
            GaugeValue::Boolean(true) => "1".to_string(),
            GaugeValue::Boolean(false) => "0".to_string(),
            GaugeValue::Float(v) | GaugeValue::Seconds(v) => format_value(*v),
        }
    }
}

impl From<i64> for GaugeValue {
    fn from(v: i64) -> Self {
        GaugeValue::Integer(v)
    }
}

impl From<i32> for GaugeValue {
    fn from(v: i32) -> Self {
        GaugeValue::Integer(v as i64)
    }
}

impl From<bool> for GaugeValue {
    fn from(v: bool) -> Self {
        GaugeValue::Boolean(v)
    }
}

impl From<f64> for GaugeValue {
    fn from(v: f64) -> Self {
        GaugeValue::Float(v)
    }
}

/// One gauge metric with its description.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub name: &'static str,
    pub help: &'static str,
    pub value: GaugeValue,
}

impl Gauge {
    pub fn new(name: &'static str, help: &'static str, value: impl Into<GaugeValue>) -> Self {
        Self {
            name,
            help,
            value: value.into(),
        }
    }

    /// The three exposition lines for this gauge.
    pub fn lines(&self) -> [String; 3] {
        [
            format!("# HELP {} {}", self.name, self.help),
            format!("# TYPE {} {}", self.name, GAUGE),
            format!("{} {}", self.name, self.value.render()),
        ]
    }
}

/// Render gauges in order as newline-joined exposition text.
pub fn render(gauges: &[Gauge]) -> String {
    gauges
        .iter()
        .flat_map(|g| g.lines())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check that a name matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
#[cfg(test)]
pub(crate) fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
