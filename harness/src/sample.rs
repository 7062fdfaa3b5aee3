use influx::{Point, Precision};
use serde::{Deserialize, Serialize};

/// Outcome of running one feature file, as recorded in the `features` measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureRun {
    pub feature: String,
    pub protocol: String,
    pub env: String,
    pub api: String,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u32,
}

impl FeatureRun {
    /// The fixed run written by the connectivity check.
    pub fn sample() -> Self {
        Self {
            feature: "tests/karate/demos/tags.feature".to_string(),
            protocol: "graphql".to_string(),
            env: "dev".to_string(),
            api: "v3".to_string(),
            passed: 43,
            failed: 5,
            skipped: 12,
            duration_ms: 619,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped
    }

    pub fn status(&self) -> &'static str {
        if self.failed > 0 {
            "failed"
        } else {
            "passed"
        }
    }

    pub fn into_point(self, measurement: &str, timestamp_ms: i64) -> Point {
        let total = self.total();
        let status = self.status();
        Point::measurement(measurement)
            .time(timestamp_ms, Precision::Milliseconds)
            .tag("feature", self.feature)
            .tag("protocol", self.protocol)
            .tag("env", self.env)
            .tag("api", self.api)
            .add_field("passed", self.passed)
            .add_field("failed", self.failed)
            .add_field("skipped", self.skipped)
            .add_field("total", total)
            .add_field("duration", self.duration_ms)
            .add_field("status", status)
    }

    /// Same as [`FeatureRun::into_point`], stamped with the current time.
    pub fn into_point_now(self, measurement: &str) -> Point {
        self.into_point(measurement, chrono::Utc::now().timestamp_millis())
    }
}
