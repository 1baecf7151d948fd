//! Stream a large result set without materialising it.

use futures_util::StreamExt;
use sqlsrv::{Client, Config, Event, TlsOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("SQLSRV_HOST").unwrap_or_else(|_| "localhost".into());
    let user = std::env::var("SQLSRV_USER").unwrap_or_else(|_| "sa".into());
    let password = std::env::var("SQLSRV_PASSWORD").unwrap_or_default();

    let config = Config::new(host, user, password).tls(TlsOptions {
        trust_server_certificate: true,
        ..TlsOptions::required()
    });
    let client = Client::new(config)?;

    let stream = client
        .stream_query(
            "SELECT object_id, name FROM sys.objects",
            Default::default(),
        )
        .await?;
    let mut stream = Box::pin(stream);

    let mut rows = 0u64;
    while let Some(event) = stream.next().await {
        match event? {
            Event::Metadata(columns) => {
                let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
                println!("columns: {}", names.join(", "));
            }
            Event::Row(_) => rows += 1,
            Event::Done(done) => println!("done, {} rows counted client-side", rows.max(done.rows)),
            _ => {}
        }
    }
    client.close().await;
    Ok(())
}
