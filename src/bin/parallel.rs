use std::sync::Arc;

use anyhow::Result;
use callmux::{ClientConfig, Connection};
use callmux_demo::demo_url;
use futures::future::join_all;

/// Issues calls from several tasks over one connection, then pumps
/// replies until every call resolves. Later tasks ask for shorter
/// delays, so the arrival order comes back roughly reversed.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let url = demo_url();
    let conn = Arc::new(Connection::connect(ClientConfig::new(&url)).await?);
    println!("connected to {url}");

    let issuers: Vec<_> = (0..8)
        .map(|i| {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let millis = format!("{}", 40 * (8 - i));
                conn.call("delay", millis.as_bytes()).await
            })
        })
        .collect();

    let mut requests = Vec::new();
    for joined in join_all(issuers).await {
        requests.push(joined??);
    }
    println!(
        "issued ids {:?}",
        requests.iter().map(|request| request.id()).collect::<Vec<_>>()
    );

    let mut arrival = Vec::new();
    while requests.iter().any(|request| !request.is_ready()) {
        if let Some(request) = conn.read_one().await? {
            arrival.push(request.id());
        }
    }
    println!("replies arrived as {arrival:?}");

    for request in &requests {
        match request.result() {
            Some(result) => println!(
                "call {} -> {}",
                request.id(),
                String::from_utf8_lossy(&result)
            ),
            None => println!("call {} failed: {:?}", request.id(), request.error()),
        }
    }

    conn.disconnect().await;
    Ok(())
}
