//! Shared helpers: an in-process fake upstream and a proxy bound to an
//! ephemeral port

#![allow(dead_code)]

use redis_auth_proxy::{ProxyConfig, ProxyServer, UpstreamCredentials};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpSocket, TcpStream},
    time::timeout,
};

/// Upper bound on any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(10);

pub const PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";
pub const PONG: &[u8] = b"+PONG\r\n";

/// expected_auth spells out the AUTH bytes by hand so the tests do not lean
/// on the encoder they are checking
pub fn expected_auth(username: &str, password: &str) -> Vec<u8> {
    let mut out = b"*3\r\n$4\r\nAUTH\r\n".to_vec();
    for arg in [username, password] {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// start_upstream binds a fake upstream on an ephemeral loopback port
pub async fn start_upstream() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// start_proxy runs a proxy in the background pointed at `upstream`
pub async fn start_proxy(upstream: SocketAddr, username: &str, password: &str) -> SocketAddr {
    let creds = credentials(upstream, username, password);
    let config =
        ProxyConfig::new("127.0.0.1:0", creds).with_connect_timeout(Duration::from_secs(2));

    let mut server = ProxyServer::new(config);
    let addr = server.bind().await.unwrap();
    tokio::spawn(server.run());
    addr
}

/// accept_authenticated accepts one proxied connection, checks the AUTH it
/// carries and answers it with `reply`
pub async fn accept_authenticated(
    listener: &TcpListener,
    username: &str,
    password: &str,
    reply: &[u8],
) -> TcpStream {
    let (mut stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();

    let expected = expected_auth(username, password);
    let mut auth = vec![0u8; expected.len()];
    timeout(WAIT, stream.read_exact(&mut auth))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(auth, expected, "upstream received an unexpected AUTH");

    stream.write_all(reply).await.unwrap();
    stream
}

/// echo copies everything it reads straight back until the peer goes away
pub async fn echo(mut stream: TcpStream) {
    let (mut rd, mut wr) = stream.split();
    let _ = tokio::io::copy(&mut rd, &mut wr).await;
}

/// saturated_upstream returns a listener that never accepts and whose accept
/// queue is already full, so any further connect hangs. The returned streams
/// hold the queue full and must stay alive for the duration of the test.
pub async fn saturated_upstream() -> (TcpListener, Vec<TcpStream>, SocketAddr) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut held = Vec::new();
    while let Ok(Ok(stream)) = timeout(Duration::from_millis(250), TcpStream::connect(addr)).await
    {
        held.push(stream);
        assert!(held.len() < 64, "accept queue never filled");
    }

    (listener, held, addr)
}

/// credentials builds upstream credentials for a loopback address
pub fn credentials(upstream: SocketAddr, username: &str, password: &str) -> UpstreamCredentials {
    UpstreamCredentials {
        host: upstream.ip().to_string(),
        port: upstream.port(),
        username: username.to_string(),
        password: password.to_string(),
    }
}
