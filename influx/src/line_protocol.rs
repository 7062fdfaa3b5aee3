//! Line protocol encoding for [`Point`]s.
//!
//! Timestamps are always emitted in nanoseconds so a batch can mix points
//! built with different precisions; writes therefore use `precision=ns`.

use crate::store::{InfluxError, InfluxResult};
use crate::types::{FieldValue, Point};
use std::fmt::Write;

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_measurement(out: &mut String, value: &str) {
    escape_into(out, value, &[',', ' ']);
}

fn escape_key(out: &mut String, value: &str) {
    escape_into(out, value, &[',', '=', ' ']);
}

fn encode_field_value(out: &mut String, key: &str, value: &FieldValue) -> InfluxResult<()> {
    match value {
        FieldValue::Integer(i) => {
            let _ = write!(out, "{}i", i);
        }
        FieldValue::Float(f) => {
            if !f.is_finite() {
                return Err(InfluxError::InvalidPoint {
                    message: format!("field '{}' is not a finite number", key),
                });
            }
            let _ = write!(out, "{}", f);
        }
        FieldValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        FieldValue::String(s) => {
            out.push('"');
            escape_into(out, s, &['"', '\\']);
            out.push('"');
        }
    }
    Ok(())
}

/// Encodes one point as a single line, without the trailing newline.
pub fn encode_point(point: &Point) -> InfluxResult<String> {
    if point.measurement.is_empty() {
        return Err(InfluxError::InvalidPoint {
            message: "measurement name cannot be empty".to_string(),
        });
    }

    if point.fields.is_empty() {
        return Err(InfluxError::InvalidPoint {
            message: format!("point '{}' has no fields", point.measurement),
        });
    }

    let mut line = String::new();
    escape_measurement(&mut line, &point.measurement);

    for (key, value) in &point.tags {
        if key.is_empty() {
            return Err(InfluxError::InvalidPoint {
                message: format!("point '{}' has an empty tag key", point.measurement),
            });
        }
        // empty tag values are rejected by the server
        if value.is_empty() {
            continue;
        }
        line.push(',');
        escape_key(&mut line, key);
        line.push('=');
        escape_key(&mut line, value);
    }

    line.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        if key.is_empty() {
            return Err(InfluxError::InvalidPoint {
                message: format!("point '{}' has an empty field key", point.measurement),
            });
        }
        if i > 0 {
            line.push(',');
        }
        escape_key(&mut line, key);
        line.push('=');
        encode_field_value(&mut line, key, value)?;
    }

    if let Some(timestamp) = point.timestamp {
        let nanos =
            point
                .precision
                .to_nanos(timestamp)
                .ok_or_else(|| InfluxError::InvalidPoint {
                    message: format!(
                        "timestamp {}{} does not fit in nanoseconds",
                        timestamp, point.precision
                    ),
                })?;
        let _ = write!(line, " {}", nanos);
    }

    Ok(line)
}

/// Encodes a batch, one line per point.
pub fn encode_points(points: &[Point]) -> InfluxResult<String> {
    let lines = points
        .iter()
        .map(encode_point)
        .collect::<InfluxResult<Vec<_>>>()?;
    Ok(lines.join("\n"))
}
