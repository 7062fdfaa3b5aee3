use crate::config::InfluxConfig;
use crate::line_protocol;
use crate::store::{InfluxError, InfluxResult, Pong, TimeSeriesStore};
use crate::types::{Point, Query, QueryResult};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const VERSION_HEADER: &str = "X-Influxdb-Version";

#[derive(Deserialize)]
struct InfluxApiError {
    error: String,
}

pub struct InfluxClient {
    http_client: reqwest::Client,
    base_url: String,
    config: InfluxConfig,
    database: Option<String>,
    closed: AtomicBool,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> InfluxResult<Self> {
        config
            .validate()
            .map_err(|msg| InfluxError::InvalidConfig { message: msg })?;

        let base_url = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InfluxError::Unknown {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url,
            config,
            database: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Builds a client and pings the server so an unreachable endpoint
    /// surfaces as [`InfluxError::Connection`] right away.
    pub async fn connect(config: InfluxConfig) -> InfluxResult<Self> {
        let client = Self::new(config)?;
        let pong = client.ping().await?;
        info!(
            "Connected to InfluxDB {} at {}",
            pong.version.as_deref().unwrap_or("(unknown version)"),
            client.config.base_url
        );
        Ok(client)
    }

    pub fn with_default_config() -> InfluxResult<Self> {
        Self::new(InfluxConfig::default())
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn set_database(&mut self, database: impl Into<String>) {
        self.database = Some(database.into());
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes one point to the database chosen with [`InfluxClient::set_database`].
    pub async fn write(&self, point: &Point) -> InfluxResult<()> {
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| InfluxError::InvalidDatabaseName {
                name: String::new(),
            })?;
        self.write_points(database, std::slice::from_ref(point))
            .await
    }

    pub async fn describe_databases(&self) -> InfluxResult<Vec<String>> {
        let result = self.query(&Query::show_databases()).await?;
        let names = result
            .series()
            .flat_map(|series| series.column_values("name"))
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        Ok(names)
    }

    pub async fn database_exists(&self, name: &str) -> InfluxResult<bool> {
        Ok(self
            .describe_databases()
            .await?
            .iter()
            .any(|db| db == name))
    }

    /// Runs a query with `chunked=true`, yielding one result per chunk the
    /// server sends.
    pub async fn query_chunked(
        &self,
        query: &Query,
        chunk_size: usize,
    ) -> InfluxResult<impl Stream<Item = InfluxResult<QueryResult>>> {
        debug!(
            "Starting chunked query (chunk size {}): {}",
            chunk_size, query.command
        );

        let chunk_size = chunk_size.max(1).to_string();
        let mut params = Self::query_params(query, self.database.as_deref());
        params.push(("chunked", "true".to_string()));
        params.push(("chunk_size", chunk_size));

        let response = self.send_query(params).await?;

        let state = ChunkState {
            bytes: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
            done: false,
        };

        Ok(futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                    if is_blank(&line) {
                        continue;
                    }
                    return Some((parse_chunk(&line), state));
                }

                if state.done {
                    if is_blank(&state.buffer) {
                        return None;
                    }
                    let line = std::mem::take(&mut state.buffer);
                    return Some((parse_chunk(&line), state));
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        state.done = true;
                        state.buffer.clear();
                        return Some((Err(InfluxError::Network(e)), state));
                    }
                    None => state.done = true,
                }
            }
        }))
    }

    fn ensure_open(&self) -> InfluxResult<()> {
        if self.is_closed() {
            return Err(InfluxError::Closed);
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    fn query_params(query: &Query, default_database: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", query.command.clone())];
        if let Some(database) = query.database.as_deref().or(default_database) {
            params.push(("db", database.to_string()));
        }
        if let Some(epoch) = query.epoch {
            params.push(("epoch", epoch.as_str().to_string()));
        }
        params
    }

    fn map_send_error(&self, e: reqwest::Error) -> InfluxError {
        if e.is_connect() || e.is_timeout() {
            InfluxError::Connection {
                url: self.config.base_url.clone(),
                message: if e.is_timeout() {
                    "Request timeout".to_string()
                } else {
                    e.to_string()
                },
            }
        } else {
            InfluxError::Network(e)
        }
    }

    async fn error_for_status(response: reqwest::Response) -> InfluxError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<InfluxApiError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            InfluxError::Authentication { message }
        } else {
            InfluxError::Server {
                status: status.as_u16(),
                message,
            }
        }
    }

    async fn send_query(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> InfluxResult<reqwest::Response> {
        self.ensure_open()?;

        let request = self.http_client.post(self.endpoint("query")).query(&params);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        Ok(response)
    }
}

struct ChunkState<S> {
    bytes: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn parse_chunk(line: &[u8]) -> InfluxResult<QueryResult> {
    let result: QueryResult = serde_json::from_slice(line)?;
    if let Some(message) = result.error_message() {
        return Err(InfluxError::Query {
            message: message.to_string(),
        });
    }
    Ok(result)
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn ping(&self) -> InfluxResult<Pong> {
        self.ensure_open()?;
        debug!("Pinging InfluxDB at {}", self.config.base_url);

        let start = Instant::now();
        let request = self.http_client.get(self.endpoint("ping"));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let err = Self::error_for_status(response).await;
            error!("Ping failed: {}", err);
            return Err(err);
        }

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Pong {
            version,
            latency: start.elapsed(),
        })
    }

    async fn query(&self, query: &Query) -> InfluxResult<QueryResult> {
        debug!("Running query: {}", query.command);

        let params = Self::query_params(query, self.database.as_deref());
        let response = self.send_query(params).await?;
        let result: QueryResult = response.json().await.map_err(InfluxError::Network)?;

        if let Some(message) = result.error_message() {
            warn!("Query '{}' returned an error: {}", query.command, message);
            return Err(InfluxError::Query {
                message: message.to_string(),
            });
        }

        Ok(result)
    }

    async fn write_points(&self, database: &str, points: &[Point]) -> InfluxResult<()> {
        self.ensure_open()?;

        if database.is_empty() {
            return Err(InfluxError::InvalidDatabaseName {
                name: database.to_string(),
            });
        }

        if points.is_empty() {
            return Ok(());
        }

        let body = line_protocol::encode_points(points)?;
        debug!("Writing {} point(s) to '{}'", points.len(), database);

        let mut params = vec![("db", database.to_string()), ("precision", "ns".to_string())];
        if let Some(rp) = &self.config.retention_policy {
            params.push(("rp", rp.clone()));
        }

        let request = self
            .http_client
            .post(self.endpoint("write"))
            .query(&params)
            .body(body);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        Ok(())
    }

    async fn create_database(&self, name: &str) -> InfluxResult<()> {
        if name.is_empty() {
            return Err(InfluxError::InvalidDatabaseName {
                name: name.to_string(),
            });
        }
        self.query(&Query::create_database(name)).await?;
        info!("Created database '{}'", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> InfluxResult<()> {
        if name.is_empty() {
            return Err(InfluxError::InvalidDatabaseName {
                name: name.to_string(),
            });
        }
        self.query(&Query::drop_database(name)).await?;
        info!("Dropped database '{}'", name);
        Ok(())
    }

    async fn close(&self) -> InfluxResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed connection to {}", self.config.base_url);
        }
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "influxdb"
    }
}
