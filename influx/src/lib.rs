pub mod client;
pub mod config;
pub mod line_protocol;
pub mod store;
pub mod types;

pub use client::InfluxClient;
pub use config::InfluxConfig;
pub use store::{InfluxError, InfluxResult, Pong, TimeSeriesStore};
pub use types::{
    quote_identifier, FieldValue, Point, Precision, Query, QueryResult, Series, StatementResult,
};

pub mod prelude {
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::store::*;
    pub use crate::types::*;
}
