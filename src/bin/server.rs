use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use callmux_demo::server::CallServer;
use callmux_demo::{DEFAULT_ADDR, SERVER_BANNER};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("CALLMUX_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

    let mut server = CallServer::new(SERVER_BANNER);
    if let (Ok(user), Ok(password)) = (
        std::env::var("CALLMUX_USER"),
        std::env::var("CALLMUX_PASSWORD"),
    ) {
        println!("requiring login as {user}");
        server = server.with_credentials(user, password);
    }

    server.register("ping", |_| async move { Ok(Bytes::new()) });
    server.register("echo", |args| async move { Ok(args) });
    server.register("fail", |_| async move { Err("deliberate failure".to_string()) });
    // Sleeps for the number of milliseconds given in the payload, then
    // echoes it. Handy for forcing out-of-order replies.
    server.register("delay", |args| async move {
        let millis = std::str::from_utf8(&args)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .unwrap_or(250);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(args)
    });

    let listener = TcpListener::bind(&addr).await?;
    println!("call server listening on {addr}");
    Arc::new(server).run(listener).await
}
