//! Connect, run a query, read typed values.
//!
//! ```sh
//! SQLSRV_HOST=localhost SQLSRV_USER=sa SQLSRV_PASSWORD=... cargo run --example basic
//! ```

use sqlsrv::{Client, Config, TlsOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("SQLSRV_HOST").unwrap_or_else(|_| "localhost".into());
    let user = std::env::var("SQLSRV_USER").unwrap_or_else(|_| "sa".into());
    let password = std::env::var("SQLSRV_PASSWORD").unwrap_or_default();

    let config = Config::new(host, user, password)
        // Lab servers usually run with a self-signed certificate.
        .tls(TlsOptions {
            trust_server_certificate: true,
            ..TlsOptions::required()
        });
    let client = Client::new(config)?;

    let version: Option<String> = client.query_scalar("SELECT @@VERSION").await?;
    println!("server: {}", version.unwrap_or_default());

    let rows = client
        .query("SELECT database_id, name FROM sys.databases ORDER BY database_id")
        .await?;
    for row in rows {
        println!(
            "{:>4}  {}",
            row.get_i32("database_id")?.unwrap_or_default(),
            row.get_string("name")?.unwrap_or_default(),
        );
    }

    client.close().await;
    Ok(())
}
