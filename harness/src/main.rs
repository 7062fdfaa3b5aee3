use clap::{Parser, Subcommand};
use futures::StreamExt;
use harness::{
    default_config, influx_server, run_check, FeatureRun, InfluxFixture, DATABASE_NAME,
    INFLUX_PASS, INFLUX_USER, MEASUREMENT_NAME,
};
use influx::prelude::*;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Checks connectivity to an InfluxDB server")]
struct Cli {
    /// InfluxDB base URL
    #[arg(long, global = true, default_value_t = influx_server())]
    url: String,
    /// Username for basic authentication
    #[arg(long, global = true, default_value = INFLUX_USER)]
    username: String,
    /// Password for basic authentication
    #[arg(long, global = true, default_value = INFLUX_PASS)]
    password: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database, write a sample point, read it back and drop the database
    Check {
        /// Database to create and drop
        #[arg(long, default_value = DATABASE_NAME)]
        database: String,
        /// Measurement to write the sample point to
        #[arg(long, default_value = MEASUREMENT_NAME)]
        measurement: String,
        /// Print the check result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ping the server
    Ping,
    /// List databases
    Databases,
    /// Run an InfluxQL query and print the result as JSON
    Query {
        /// The InfluxQL statement
        query: String,
        /// Database to run the query against
        #[arg(short, long)]
        database: Option<String>,
        /// Timestamp precision for returned times (ns, u, ms, s, m, h)
        #[arg(long)]
        epoch: Option<Precision>,
        /// Stream the result in chunks of this many points
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = default_config()
        .with_base_url(cli.url)
        .with_credentials(cli.username, cli.password);

    match cli.command {
        Commands::Check {
            database,
            measurement,
            json,
        } => {
            check(config, &database, &measurement, json).await?;
        }
        Commands::Ping => {
            ping(config).await?;
        }
        Commands::Databases => {
            list_databases(config).await?;
        }
        Commands::Query {
            query,
            database,
            epoch,
            chunk_size,
        } => {
            run_query(config, query, database, epoch, chunk_size).await?;
        }
    }

    Ok(())
}

async fn check(
    config: InfluxConfig,
    database: &str,
    measurement: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = InfluxFixture::setup_with(config, database).await?;
    if !fixture.is_connected() {
        return Err("InfluxDB is not reachable".into());
    }

    let point = FeatureRun::sample().into_point_now(measurement);

    match run_check(fixture, &point).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "✓ Wrote and read back '{}' in database '{}'",
                    result.series_name, result.database
                );
                println!("  Columns: {}", result.columns.join(", "));
                println!("  Rows: {}", result.rows);
            }
            info!("Measurement check passed");
            Ok(())
        }
        Err(e) => {
            println!("✗ Measurement check failed: {}", e);
            error!("Measurement check failed: {}", e);
            Err(e.into())
        }
    }
}

async fn ping(config: InfluxConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Pinging {}...", config.base_url);
    let client = InfluxClient::new(config)?;

    match client.ping().await {
        Ok(pong) => {
            println!(
                "✓ InfluxDB {} responded in {}ms",
                pong.version.as_deref().unwrap_or("(unknown version)"),
                pong.latency.as_millis()
            );
        }
        Err(e) => {
            println!("✗ Ping failed: {}", e);
            error!("Ping failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn list_databases(config: InfluxConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = InfluxClient::new(config)?;
    let databases = client.describe_databases().await?;

    println!("Databases:");
    if databases.is_empty() {
        println!("  No databases found.");
    } else {
        for name in databases {
            println!("  - {}", name);
        }
    }

    Ok(())
}

async fn run_query(
    config: InfluxConfig,
    command: String,
    database: Option<String>,
    epoch: Option<Precision>,
    chunk_size: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = InfluxClient::new(config)?;

    let mut query = Query::new(command);
    if let Some(database) = database {
        query = query.on(database);
    }
    if let Some(epoch) = epoch {
        query = query.with_epoch(epoch);
    }

    match chunk_size {
        Some(size) => {
            let stream = client.query_chunked(&query, size).await?;
            futures::pin_mut!(stream);
            while let Some(chunk) = stream.next().await {
                println!("{}", serde_json::to_string(&chunk?)?);
            }
        }
        None => {
            let result = client.query(&query).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
