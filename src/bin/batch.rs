use anyhow::{Result, bail};
use callmux::{ClientConfig, Connection};
use callmux_demo::demo_url;

/// Issues two calls back to back, reads exactly two replies, and tells
/// them apart by handle. Finishes with a call that is deliberately
/// abandoned to show the cancellation path.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let url = demo_url();
    let conn = Connection::connect(ClientConfig::new(&url)).await?;
    println!("connected to {url}");

    let slow = conn.call("delay", b"200").await?;
    let fast = conn.call("echo", b"right away").await?;

    for _ in 0..2 {
        let Some(request) = conn.read_one().await? else {
            bail!("stream ended before both replies arrived");
        };
        let label = if request == fast {
            "fast"
        } else if request == slow {
            "slow"
        } else {
            "unexpected"
        };
        println!("{label} call {} answered: {:?}", request.id(), request.result());
    }

    let orphan = conn.call("delay", b"60000").await?;
    conn.disconnect().await;
    println!(
        "orphan after disconnect: ready={} error={:?}",
        orphan.is_ready(),
        orphan.error().map(|text| String::from_utf8_lossy(&text).into_owned()),
    );

    Ok(())
}
