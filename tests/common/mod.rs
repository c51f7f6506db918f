//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use priority_proxy::cache::resp::encode_command;
use priority_proxy::config::ProxyConfig;
use priority_proxy::net::Listener;
use priority_proxy::observability::Logger;
use priority_proxy::proxy::{FrameDump, ProxyError};
use priority_proxy::{FramePipeline, ProxyServer, Shutdown};

/// Backend that echoes every byte back, optionally after a greeting.
pub async fn start_echo_backend(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                if !greeting.is_empty() && wr.write_all(greeting).await.is_err() {
                    return;
                }
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Loopback proxy config pointed at `backend`, idle probe off.
pub fn proxy_config(backend: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.listener.idle_probe_timeout_ms = 0;
    config.listener.drain_timeout_ms = 300;
    config.backend.host = backend.ip().to_string();
    config.backend.port = backend.port();
    config.backend.connect_timeout_secs = 1;
    config.shaping.owner_lookup_enabled = false;
    config
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ProxyError>>,
}

impl TestProxy {
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

pub async fn start_proxy(config: ProxyConfig, dump: Option<FrameDump>) -> TestProxy {
    let pipeline = Arc::new(FramePipeline::new(&config.shaping, None, Logger::none()));
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(&config, pipeline, dump, Logger::none());

    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));
    TestProxy { addr, shutdown, task }
}

/// Job submission in the queue library's add-job shape.
pub fn add_job(workflow_id: &str, priority: i64) -> Vec<u8> {
    encode_command(&[
        "EVAL".to_string(),
        "return 1".to_string(),
        "0".to_string(),
        format!(r#"{{"workflowId":"{workflow_id}","executionId":"e1"}}"#),
        format!(r#"{{"priority":{priority},"attempts":1}}"#),
        "1700000000000".to_string(),
        "0".to_string(),
        priority.to_string(),
    ])
}

/// What the backend should receive for `add_job(workflow_id, old)`.
///
/// Only the options object and the trailing priority argument change;
/// length headers are left as the client wrote them.
pub fn rewritten_job(workflow_id: &str, old: i64, new: i64) -> Vec<u8> {
    let original = String::from_utf8(add_job(workflow_id, old)).unwrap();
    let body = original.replace(&format!(r#""priority":{old},"#), &format!(r#""priority":{new},"#));
    let head = body.strip_suffix(&format!("\r\n{old}\r\n")).unwrap();
    format!("{head}\r\n{new}\r\n").into_bytes()
}
