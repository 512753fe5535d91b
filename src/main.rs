//! lwmsg: one-shot TCP messaging server and client.
//!
//! - `lwmsg serve` binds a listener and answers each connection with a
//!   built-in handler until Ctrl-C.
//! - `lwmsg send <message>` sends one message and prints the response.

use lwmsg::config::{Config, Mode};
use lwmsg::server::resolve_bind_addr;
use lwmsg::{Client, HandlerKind, Listener, SENTINEL};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match config.mode {
        Mode::Serve {
            host,
            port,
            handler,
            workers,
        } => {
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            if let Some(workers) = workers {
                builder.worker_threads(workers);
            }
            let runtime = builder.enable_all().build()?;
            runtime.block_on(serve(host, port, handler))
        }
        Mode::Send {
            host,
            port,
            timeout,
            message,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(send(host, port, timeout, message))
        }
    }
}

/// Serve until Ctrl-C, then release the listening socket.
async fn serve(
    host: String,
    port: u16,
    handler: HandlerKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = resolve_bind_addr(&host, port).await?;
    let listener = Listener::bind_addr(addr, handler.build())?;

    info!(
        address = %listener.local_addr(),
        handler = ?handler,
        "Starting lwmsg server"
    );

    tokio::select! {
        _ = listener.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown requested");
        }
    }

    listener.close();
    Ok(())
}

/// Send one message and print whatever comes back, timeout marker included.
async fn send(
    host: String,
    port: u16,
    timeout: u64,
    mut message: String,
) -> Result<(), Box<dyn std::error::Error>> {
    if !message.ends_with(SENTINEL as char) {
        message.push(SENTINEL as char);
    }

    let mut client = Client::try_connect(&host, port).await?;
    client.send_message(&message).await?;
    let response = client.listen_and_exit(timeout).await?;
    println!("{response}");
    Ok(())
}
