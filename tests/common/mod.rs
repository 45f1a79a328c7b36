//! Test utilities for Glint integration tests
//!
//! Spins up a complete tunnel (local agent + remote agent) on ephemeral
//! ports, plus throwaway TCP destinations to tunnel to.

use glint::config::Config;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Shared password for test tunnels
pub const TEST_PASSWORD: &str = "integration-test-password";

fn config(server_port: u16, timeout: u64) -> Config {
    Config {
        server: "127.0.0.1".to_string(),
        server_port,
        local_port: 0,
        password: TEST_PASSWORD.to_string(),
        method: "aes-256-cfb".to_string(),
        timeout,
    }
}

/// Start a full tunnel and return the SOCKS5 address clients should dial.
pub async fn spawn_tunnel(timeout: u64) -> SocketAddr {
    let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let remote_port = remote_listener.local_addr().unwrap().port();
    let remote_config = config(remote_port, timeout);
    tokio::spawn(async move {
        let _ = glint::remote::serve(remote_listener, remote_config).await;
    });

    let local_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = local_listener.local_addr().unwrap();
    let local_config = config(remote_port, timeout);
    tokio::spawn(async move {
        let _ = glint::local::serve(local_listener, local_config).await;
    });

    local_addr
}

/// Start a TCP echo server on an ephemeral port.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Start a TCP server that writes `banner` immediately on accept and then
/// closes. Exercises the remote-to-local direction with no prior
/// local-to-remote payload.
pub async fn spawn_banner_server(banner: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let _ = stream.write_all(banner).await;
            });
        }
    });
    addr
}
