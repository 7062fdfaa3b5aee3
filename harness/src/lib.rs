pub mod fixture;
pub mod report;
pub mod sample;

pub use fixture::{
    default_config, influx_server, run_check, FixtureError, InfluxFixture, MeasurementCheck,
    DATABASE_NAME, EXPECTED_COLUMNS, INFLUX_HOST, INFLUX_PASS, INFLUX_PORT, INFLUX_USER,
    MEASUREMENT_NAME,
};
pub use report::connection_error_banner;
pub use sample::FeatureRun;
