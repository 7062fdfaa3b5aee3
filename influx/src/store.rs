use crate::types::{Point, Query, QueryResult};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfluxError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to connect to InfluxDB at {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("InfluxDB returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid point: {message}")]
    InvalidPoint { message: String },

    #[error("Invalid database name: '{name}'")]
    InvalidDatabaseName { name: String },

    #[error("Connection has been closed")]
    Closed,

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl InfluxError {
    /// True when the server could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, InfluxError::Connection { .. })
    }
}

pub type InfluxResult<T> = Result<T, InfluxError>;

/// Reply to a ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub version: Option<String>,
    pub latency: Duration,
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn ping(&self) -> InfluxResult<Pong>;

    async fn query(&self, query: &Query) -> InfluxResult<QueryResult>;

    async fn write_points(&self, database: &str, points: &[Point]) -> InfluxResult<()>;

    async fn create_database(&self, name: &str) -> InfluxResult<()>;

    async fn drop_database(&self, name: &str) -> InfluxResult<()>;

    async fn close(&self) -> InfluxResult<()>;

    fn store_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Series;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        databases: Mutex<Vec<String>>,
        written: Mutex<Vec<Point>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl TimeSeriesStore for MockStore {
        async fn ping(&self) -> InfluxResult<Pong> {
            Ok(Pong {
                version: Some("mock".to_string()),
                latency: Duration::from_millis(1),
            })
        }

        async fn query(&self, _query: &Query) -> InfluxResult<QueryResult> {
            let written = self.written.lock().unwrap();
            let series = written
                .iter()
                .map(|point| Series {
                    name: point.measurement.clone(),
                    columns: point.fields.keys().cloned().collect(),
                    ..Series::default()
                })
                .collect();
            Ok(QueryResult {
                results: vec![crate::types::StatementResult {
                    series,
                    ..Default::default()
                }],
                error: None,
            })
        }

        async fn write_points(&self, _database: &str, points: &[Point]) -> InfluxResult<()> {
            self.written.lock().unwrap().extend_from_slice(points);
            Ok(())
        }

        async fn create_database(&self, name: &str) -> InfluxResult<()> {
            self.databases.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn drop_database(&self, name: &str) -> InfluxResult<()> {
            self.databases.lock().unwrap().retain(|db| db != name);
            Ok(())
        }

        async fn close(&self) -> InfluxResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn store_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_store() {
        let store = MockStore::default();

        store.create_database("karate").await.unwrap();
        assert_eq!(*store.databases.lock().unwrap(), vec!["karate".to_string()]);

        let point = Point::measurement("features").add_field("passed", 43);
        store.write_points("karate", &[point]).await.unwrap();

        let result = store.query(&Query::select_all("features")).await.unwrap();
        let series = result.first_series().unwrap();
        assert_eq!(series.name, "features");
        assert_eq!(series.columns, vec!["passed".to_string()]);

        store.drop_database("karate").await.unwrap();
        assert!(store.databases.lock().unwrap().is_empty());

        store.close().await.unwrap();
        assert!(store.closed.load(Ordering::SeqCst));
        assert_eq!(store.ping().await.unwrap().version.as_deref(), Some("mock"));
        assert_eq!(store.store_name(), "mock");
    }

    #[test]
    fn test_connection_error_classification() {
        let err = InfluxError::Connection {
            url: "http://localhost:8086".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.is_connection());
        assert_eq!(
            err.to_string(),
            "Failed to connect to InfluxDB at http://localhost:8086: connection refused"
        );
        assert!(!InfluxError::Closed.is_connection());
    }
}
