//! Serve an `Arith` service on loopback and call it concurrently.
//!
//! ```text
//! RUST_LOG=wirerpc=debug cargo run --example sum
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wirerpc::codec::JSON_TYPE;
use wirerpc::service::{MethodSet, Service};
use wirerpc::{Client, Options, Server};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

struct Arith;

impl Arith {
    fn sum(&self, args: Args, reply: &mut i64) -> Result<(), String> {
        *reply = args.num1 + args.num2;
        Ok(())
    }

    fn div(&self, args: Args, reply: &mut i64) -> Result<(), String> {
        if args.num2 == 0 {
            return Err("divide by zero".to_string());
        }
        *reply = args.num1 / args.num2;
        Ok(())
    }

    fn slow(&self, millis: u64, reply: &mut u64) -> Result<(), String> {
        std::thread::sleep(Duration::from_millis(millis));
        *reply = millis;
        Ok(())
    }
}

impl Service for Arith {
    fn methods(set: &mut MethodSet<Self>) {
        set.add("Sum", Arith::sum)
            .add("Div", Arith::div)
            .add("Slow", Arith::slow);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = Server::new();
    server.register(Arith)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    info!("serving on {}", addr);
    tokio::spawn(async move { server.accept(listener).await });

    let client = Arc::new(Client::dial(&addr.to_string(), Options::default()).await?);

    let mut tasks = Vec::new();
    for i in 0..5i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let args = Args { num1: i, num2: i * i };
            let reply: wirerpc::Result<i64> = client.call("Arith.Sum", &args).await;
            (args, reply)
        }));
    }
    for task in tasks {
        let (args, reply) = task.await?;
        info!("{} + {} = {}", args.num1, args.num2, reply?);
    }

    if let Err(e) = client.call::<_, i64>("Arith.Div", &Args { num1: 1, num2: 0 }).await {
        info!("Arith.Div failed: {}", e);
    }

    let json = Client::xdial(
        &format!("tcp@{}", addr),
        Options::default()
            .with_codec_type(JSON_TYPE)
            .with_handle_timeout(Duration::from_millis(100)),
    )
    .await?;
    match json.call::<_, u64>("Arith.Slow", &500u64).await {
        Ok(reply) => info!("Arith.Slow = {}", reply),
        Err(e) => info!("Arith.Slow failed: {}", e),
    }

    client.close().await?;
    json.close().await?;
    Ok(())
}
