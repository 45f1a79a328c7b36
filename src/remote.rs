//! Remote agent
//!
//! Accepts encrypted connections from local agents, decodes the address
//! preamble that leads each one, dials the destination and relays. Every
//! accepted connection gets its own cipher session from the shared
//! template.

use crate::addr::TargetAddr;
use crate::config::Config;
use crate::crypto::CipherTemplate;
use crate::error::GlintError;
use crate::framed::EncryptedStream;
use crate::relay::{relay, with_read_deadline};
use anyhow::Result;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Immutable per-agent state shared by every session
struct RemoteContext {
    template: CipherTemplate,
    read_timeout: Option<Duration>,
}

/// Run the remote agent until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.server_port)).await?;
    info!("server listening on port {}", config.server_port);
    serve(listener, config).await
}

/// Accept tunnel connections on an already-bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> Result<()> {
    let template = CipherTemplate::new(&config.method, &config.password)?;
    let ctx = Arc::new(RemoteContext {
        template,
        read_timeout: config.read_timeout(),
    });

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("new client {}", peer);
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

/// Drive one tunnel connection: decode the preamble, dial, relay.
async fn handle_session(stream: TcpStream, ctx: Arc<RemoteContext>) -> Result<(), GlintError> {
    let encrypted = EncryptedStream::new(stream, ctx.template.session());
    let (mut tunnel_read, tunnel_write) = encrypted.into_split();

    let target = with_read_deadline(
        ctx.read_timeout,
        TargetAddr::read_from(&mut tunnel_read),
    )
    .await??;

    debug!("connecting to {}", target);
    let destination = match target.connect().await {
        Ok(stream) => stream,
        Err(e) => {
            if is_fd_exhaustion(&e) {
                // EMFILE is this process at its fd limit, ENFILE the system
                error!("dial error: {}", e);
            } else {
                warn!("error connecting to {}: {}", target, e);
            }
            return Ok(());
        }
    };

    let (dest_read, dest_write) = tokio::io::split(destination);
    relay(
        tunnel_read,
        tunnel_write,
        dest_read,
        dest_write,
        ctx.read_timeout,
    )
    .await;

    debug!("closed pipe to {}", target);
    Ok(())
}

#[cfg(unix)]
fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &io::Error) -> bool {
    false
}
