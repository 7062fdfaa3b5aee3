//! Setup, check and teardown around a throwaway InfluxDB database.
//!
//! [`InfluxFixture::setup`] connects to the local server and creates the
//! database. A server that cannot be reached is reported on the console and
//! leaves the fixture disconnected, so the check itself fails with
//! [`FixtureError::NotConnected`] instead of a transport error.

use crate::report::connection_error_banner;
use influx::{
    InfluxClient, InfluxConfig, InfluxError, InfluxResult, Point, Query, TimeSeriesStore,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const INFLUX_HOST: &str = "localhost";
pub const INFLUX_PORT: u16 = 8086;
pub const INFLUX_USER: &str = "root";
pub const INFLUX_PASS: &str = "root";

pub const DATABASE_NAME: &str = "karate";
pub const MEASUREMENT_NAME: &str = "features";
pub const EXPECTED_COLUMNS: [&str; 3] = ["passed", "failed", "skipped"];

pub fn influx_server() -> String {
    format!("http://{}:{}", INFLUX_HOST, INFLUX_PORT)
}

/// Connection settings for the local test server.
pub fn default_config() -> InfluxConfig {
    InfluxConfig::default()
        .with_base_url(influx_server())
        .with_credentials(INFLUX_USER, INFLUX_PASS)
}

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Not connected to InfluxDB; setup could not reach the server")]
    NotConnected,

    #[error("InfluxDB error: {0}")]
    Influx(#[from] InfluxError),

    #[error("Query for measurement '{measurement}' returned no series")]
    NoSeries { measurement: String },

    #[error("Expected series '{expected}', got '{actual}'")]
    SeriesNameMismatch { expected: String, actual: String },

    #[error("Series '{series}' is missing columns: {missing:?}")]
    MissingColumns { series: String, missing: Vec<String> },
}

/// What the check observed after writing and reading back a point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeasurementCheck {
    pub database: String,
    pub measurement: String,
    pub series_name: String,
    pub series_count: usize,
    pub columns: Vec<String>,
    pub rows: usize,
}

pub struct InfluxFixture<S = InfluxClient> {
    store: Option<S>,
    database: String,
}

impl InfluxFixture<InfluxClient> {
    /// Connects to the hardcoded local server and creates [`DATABASE_NAME`].
    pub async fn setup() -> InfluxResult<Self> {
        Self::setup_with(default_config(), DATABASE_NAME).await
    }

    pub async fn setup_with(config: InfluxConfig, database: &str) -> InfluxResult<Self> {
        let server = config.base_url.clone();
        let port = config.port();

        let prepared = match InfluxClient::connect(config).await {
            Ok(client) => Self::prepare(client.with_database(database), database).await,
            Err(e) => Err(e),
        };

        match prepared {
            Ok(fixture) => Ok(fixture),
            Err(e) if e.is_connection() => {
                warn!("InfluxDB is not reachable, continuing disconnected: {}", e);
                println!("{}", connection_error_banner(&server, port));
                Ok(Self::disconnected(database))
            }
            Err(e) => Err(e),
        }
    }
}

impl<S: TimeSeriesStore> InfluxFixture<S> {
    /// Creates `database` on `store` and wraps both.
    pub async fn prepare(store: S, database: &str) -> InfluxResult<Self> {
        store.create_database(database).await?;
        Ok(Self::with_store(store, database))
    }

    pub fn with_store(store: S, database: &str) -> Self {
        Self {
            store: Some(store),
            database: database.to_string(),
        }
    }

    pub fn disconnected(database: &str) -> Self {
        Self {
            store: None,
            database: database.to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Writes `point`, selects everything from its measurement and verifies
    /// the returned series name and columns.
    pub async fn check_measurement(
        &self,
        point: &Point,
        expected_columns: &[&str],
    ) -> Result<MeasurementCheck, FixtureError> {
        let store = self.store.as_ref().ok_or(FixtureError::NotConnected)?;
        let measurement = &point.measurement;

        store
            .write_points(&self.database, std::slice::from_ref(point))
            .await?;
        debug!("Wrote point to '{}.{}'", self.database, measurement);

        let query = Query::select_all(measurement).on(self.database.as_str());
        let result = store.query(&query).await?;

        let series = result
            .first_series()
            .ok_or_else(|| FixtureError::NoSeries {
                measurement: measurement.clone(),
            })?;

        if series.name != *measurement {
            return Err(FixtureError::SeriesNameMismatch {
                expected: measurement.clone(),
                actual: series.name.clone(),
            });
        }

        let missing = series.missing_columns(expected_columns);
        if !missing.is_empty() {
            return Err(FixtureError::MissingColumns {
                series: series.name.clone(),
                missing,
            });
        }

        info!(
            "Measurement '{}' read back with {} row(s)",
            measurement,
            series.row_count()
        );

        Ok(MeasurementCheck {
            database: self.database.clone(),
            measurement: measurement.clone(),
            series_name: series.name.clone(),
            series_count: result.series().count(),
            columns: series.columns.clone(),
            rows: series.row_count(),
        })
    }

    /// Drops the database and closes the store. Does nothing when setup
    /// never connected.
    pub async fn teardown(self) -> InfluxResult<()> {
        let Some(store) = self.store else {
            debug!("Fixture was never connected, nothing to tear down");
            return Ok(());
        };

        store.drop_database(&self.database).await?;
        store.close().await?;
        info!("Tore down database '{}'", self.database);
        Ok(())
    }
}

/// Runs the measurement check, always tears the fixture down, then reports
/// the check outcome ahead of any teardown failure.
pub async fn run_check<S: TimeSeriesStore>(
    fixture: InfluxFixture<S>,
    point: &Point,
) -> Result<MeasurementCheck, FixtureError> {
    let outcome = fixture.check_measurement(point, &EXPECTED_COLUMNS).await;
    let teardown = fixture.teardown().await;

    let check = outcome?;
    teardown?;
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::FeatureRun;
    use async_trait::async_trait;
    use influx::{FieldValue, Pong, QueryResult, Series, StatementResult};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryState {
        databases: BTreeMap<String, Vec<Point>>,
        closed: bool,
        drop_writes: bool,
    }

    #[derive(Clone, Default)]
    struct MemoryStore {
        state: Arc<Mutex<MemoryState>>,
    }

    fn field_json(value: &FieldValue) -> serde_json::Value {
        match value {
            FieldValue::Integer(i) => serde_json::json!(i),
            FieldValue::Float(f) => serde_json::json!(f),
            FieldValue::Boolean(b) => serde_json::json!(b),
            FieldValue::String(s) => serde_json::json!(s),
        }
    }

    fn to_series(measurement: &str, points: &[&Point]) -> Series {
        let mut keys = BTreeSet::new();
        for point in points {
            keys.extend(point.tags.keys().cloned());
            keys.extend(point.fields.keys().cloned());
        }
        let mut columns = vec!["time".to_string()];
        columns.extend(keys);

        let values = points
            .iter()
            .map(|point| {
                columns
                    .iter()
                    .map(|column| {
                        if column == "time" {
                            return serde_json::json!(point.timestamp);
                        }
                        point
                            .tags
                            .get(column)
                            .map(|tag| serde_json::json!(tag))
                            .or_else(|| point.fields.get(column).map(field_json))
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .collect()
            })
            .collect();

        Series {
            name: measurement.to_string(),
            columns,
            values,
            ..Series::default()
        }
    }

    #[async_trait]
    impl TimeSeriesStore for MemoryStore {
        async fn ping(&self) -> InfluxResult<Pong> {
            Ok(Pong {
                version: None,
                latency: Duration::ZERO,
            })
        }

        async fn query(&self, query: &Query) -> InfluxResult<QueryResult> {
            let state = self.state.lock().unwrap();
            let database = query.database.as_deref().unwrap_or_default();
            let points = state
                .databases
                .get(database)
                .ok_or_else(|| InfluxError::Query {
                    message: format!("database not found: {}", database),
                })?;

            let measurements: BTreeSet<&str> =
                points.iter().map(|p| p.measurement.as_str()).collect();
            let series = measurements
                .into_iter()
                .filter(|m| Query::select_all(m).command == query.command)
                .map(|m| {
                    let matching: Vec<&Point> =
                        points.iter().filter(|p| p.measurement == m).collect();
                    to_series(m, &matching)
                })
                .collect();

            Ok(QueryResult {
                results: vec![StatementResult {
                    series,
                    ..StatementResult::default()
                }],
                error: None,
            })
        }

        async fn write_points(&self, database: &str, points: &[Point]) -> InfluxResult<()> {
            let mut state = self.state.lock().unwrap();
            if state.drop_writes {
                return Ok(());
            }
            let stored = state
                .databases
                .get_mut(database)
                .ok_or_else(|| InfluxError::Server {
                    status: 404,
                    message: format!("database not found: \"{}\"", database),
                })?;
            stored.extend_from_slice(points);
            Ok(())
        }

        async fn create_database(&self, name: &str) -> InfluxResult<()> {
            self.state
                .lock()
                .unwrap()
                .databases
                .entry(name.to_string())
                .or_default();
            Ok(())
        }

        async fn drop_database(&self, name: &str) -> InfluxResult<()> {
            self.state.lock().unwrap().databases.remove(name);
            Ok(())
        }

        async fn close(&self) -> InfluxResult<()> {
            self.state.lock().unwrap().closed = true;
            Ok(())
        }

        fn store_name(&self) -> &'static str {
            "memory"
        }
    }

    #[test]
    fn test_default_config_targets_local_server() {
        let config = default_config();
        assert_eq!(config.base_url, "http://localhost:8086");
        assert_eq!(config.username.as_deref(), Some("root"));
        assert_eq!(config.password.as_deref(), Some("root"));
        assert_eq!(config.port(), Some(INFLUX_PORT));
    }

    #[tokio::test]
    async fn test_check_writes_and_reads_back() {
        let store = MemoryStore::default();
        let fixture = InfluxFixture::prepare(store.clone(), DATABASE_NAME)
            .await
            .unwrap();
        assert!(fixture.is_connected());
        assert_eq!(fixture.database(), DATABASE_NAME);

        let point = FeatureRun::sample().into_point(MEASUREMENT_NAME, 1_700_000_000_000);
        let check = fixture
            .check_measurement(&point, &EXPECTED_COLUMNS)
            .await
            .unwrap();

        assert_eq!(check.series_name, MEASUREMENT_NAME);
        assert_eq!(check.series_count, 1);
        assert_eq!(check.rows, 1);
        for column in EXPECTED_COLUMNS {
            assert!(check.columns.iter().any(|c| c == column));
        }

        fixture.teardown().await.unwrap();
        let state = store.state.lock().unwrap();
        assert!(!state.databases.contains_key(DATABASE_NAME));
        assert!(state.closed);
    }

    #[tokio::test]
    async fn test_disconnected_fixture() {
        let fixture: InfluxFixture<MemoryStore> = InfluxFixture::disconnected(DATABASE_NAME);
        assert!(!fixture.is_connected());
        assert!(fixture.store().is_none());

        let point = FeatureRun::sample().into_point_now(MEASUREMENT_NAME);
        let result = fixture.check_measurement(&point, &EXPECTED_COLUMNS).await;
        assert!(matches!(result, Err(FixtureError::NotConnected)));

        fixture.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_columns_reported() {
        let fixture = InfluxFixture::prepare(MemoryStore::default(), DATABASE_NAME)
            .await
            .unwrap();
        let point = Point::measurement(MEASUREMENT_NAME).add_field("passed", 1);

        match fixture.check_measurement(&point, &EXPECTED_COLUMNS).await {
            Err(FixtureError::MissingColumns { series, missing }) => {
                assert_eq!(series, MEASUREMENT_NAME);
                assert_eq!(missing, vec!["failed".to_string(), "skipped".to_string()]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_series_reported() {
        let store = MemoryStore::default();
        store.state.lock().unwrap().drop_writes = true;
        let fixture = InfluxFixture::prepare(store, DATABASE_NAME).await.unwrap();

        let point = FeatureRun::sample().into_point_now(MEASUREMENT_NAME);
        let result = fixture.check_measurement(&point, &EXPECTED_COLUMNS).await;
        assert!(matches!(result, Err(FixtureError::NoSeries { .. })));
    }

    #[tokio::test]
    async fn test_write_errors_propagate() {
        // no prepare: the database was never created
        let fixture = InfluxFixture::with_store(MemoryStore::default(), DATABASE_NAME);
        let point = FeatureRun::sample().into_point_now(MEASUREMENT_NAME);

        let result = fixture.check_measurement(&point, &EXPECTED_COLUMNS).await;
        assert!(matches!(
            result,
            Err(FixtureError::Influx(InfluxError::Server { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_check_tears_down_on_failure() {
        let store = MemoryStore::default();
        let fixture = InfluxFixture::prepare(store.clone(), DATABASE_NAME)
            .await
            .unwrap();
        let point = Point::measurement(MEASUREMENT_NAME).add_field("passed", 1);

        let result = run_check(fixture, &point).await;
        assert!(matches!(result, Err(FixtureError::MissingColumns { .. })));

        let state = store.state.lock().unwrap();
        assert!(state.databases.is_empty());
        assert!(state.closed);
    }
}
