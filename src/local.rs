//! Local agent
//!
//! Accepts SOCKS5 CONNECT requests on the loopback interface and forwards
//! each one through a freshly dialed encrypted connection to the remote
//! agent. The captured raw address preamble is the first plaintext written
//! upstream, which also triggers IV generation and transmission.

use crate::config::{self, Config};
use crate::crypto::CipherTemplate;
use crate::error::GlintError;
use crate::framed::EncryptedStream;
use crate::relay::{relay, with_read_deadline};
use crate::socks;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Total TCP connect attempts before the upstream dial is abandoned
const DIAL_ATTEMPTS: u32 = 3;

/// Immutable per-agent state shared by every session
struct LocalContext {
    server_addr: String,
    template: CipherTemplate,
    read_timeout: Option<Duration>,
}

/// Run the local agent until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", config.local_port)).await?;
    info!(
        "SOCKS5 listening on 127.0.0.1:{}, tunneling via {}",
        config.local_port,
        config.server_addr()
    );
    serve(listener, config).await
}

/// Accept SOCKS5 clients on an already-bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> Result<()> {
    let template = CipherTemplate::new(&config.method, &config.password)?;
    if config::host_has_port(&config.server) && config.server_port != 0 {
        info!("ignoring server_port option for server {}", config.server);
    }

    let ctx = Arc::new(LocalContext {
        server_addr: config.server_addr(),
        template,
        read_timeout: config.read_timeout(),
    });

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("socks connect from {}", peer);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = handle_session(stream, ctx).await {
                        warn!("session error: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("accept error: {}", e);
            }
        }
    }
}

/// Drive one client connection from greeting to relay teardown.
async fn handle_session(mut client: TcpStream, ctx: Arc<LocalContext>) -> Result<(), GlintError> {
    with_read_deadline(ctx.read_timeout, socks::handshake(&mut client)).await??;
    let request =
        with_read_deadline(ctx.read_timeout, socks::read_request(&mut client)).await??;
    client.write_all(&socks::CONNECT_REPLY).await?;

    let mut upstream = connect_to_server(&ctx, &request.target.to_string()).await?;
    // first plaintext upstream is the raw preamble; this write also emits
    // the connection's IV
    upstream.write_all(&request.preamble).await?;

    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = upstream.into_split();
    relay(
        client_read,
        client_write,
        upstream_read,
        upstream_write,
        ctx.read_timeout,
    )
    .await;

    debug!("closed connection to {}", request.target);
    Ok(())
}

/// Dial the remote agent, retrying the TCP connect up to [`DIAL_ATTEMPTS`]
/// times in total.
async fn connect_to_server(
    ctx: &LocalContext,
    dest: &str,
) -> Result<EncryptedStream<TcpStream>, GlintError> {
    for attempt in 1..=DIAL_ATTEMPTS {
        match EncryptedStream::connect(&ctx.server_addr, &ctx.template).await {
            Ok(stream) => {
                debug!("connected to {} via {}", dest, ctx.server_addr);
                return Ok(stream);
            }
            Err(e) => {
                warn!(
                    "error connecting to server {} (attempt {}/{}): {}",
                    ctx.server_addr, attempt, DIAL_ATTEMPTS, e
                );
            }
        }
    }
    Err(GlintError::DialFailed {
        dest: dest.to_string(),
        attempts: DIAL_ATTEMPTS,
    })
}
