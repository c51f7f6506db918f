//! Remote cache tier speaking RESP to an external store.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::resp::{encode_command, read_value, RespValue};
use super::{CacheError, CacheService};
use crate::config::BackendConfig;
use crate::observability::metrics;

/// Connection settings for the remote tier.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub address: String,
    pub password: Option<String>,
    pub db: Option<u32>,
    pub connect_timeout: Duration,
    /// Upper bound on one command's write plus reply.
    pub command_timeout: Duration,
}

impl From<&BackendConfig> for RemoteConfig {
    fn from(backend: &BackendConfig) -> Self {
        Self {
            address: backend.address(),
            password: backend.password.clone(),
            db: backend.db,
            connect_timeout: backend.connect_timeout(),
            command_timeout: backend.connect_timeout(),
        }
    }
}

/// Thin client over one lazily established, reused connection.
///
/// Commands are serialized through the connection lock. A connection that
/// fails mid-command is dropped and re-established on the next call.
pub struct RemoteCache {
    config: RemoteConfig,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

impl RemoteCache {
    /// Create a client; no connection is opened until the first command.
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Whether a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn connect(&self) -> Result<BufReader<TcpStream>, CacheError> {
        let address = &self.config.address;
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(CacheError::Connect {
                    address: address.clone(),
                    source,
                })
            }
            Err(_) => return Err(CacheError::ConnectTimeout(address.clone())),
        };
        stream.set_nodelay(true)?;
        let mut conn = BufReader::new(stream);

        if let Some(password) = &self.config.password {
            expect_ok("AUTH", self.roundtrip(&mut conn, &[b"AUTH".as_slice(), password.as_bytes()]).await?)?;
        }
        if let Some(db) = self.config.db {
            let db = db.to_string();
            expect_ok("SELECT", self.roundtrip(&mut conn, &[b"SELECT".as_slice(), db.as_bytes()]).await?)?;
        }

        tracing::debug!(address = %address, "Remote cache connected");
        Ok(conn)
    }

    /// Run one command on the shared connection, connecting first if needed.
    async fn command(&self, args: &[&[u8]]) -> Result<RespValue, CacheError> {
        let mut guard = self.conn.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect().await.inspect_err(|_| {
                metrics::record_backend_error("remote_cache_connect");
            })?,
        };

        match self.roundtrip(&mut conn, args).await {
            Ok(reply) => {
                *guard = Some(conn);
                match reply {
                    RespValue::Error(message) => Err(CacheError::Server(message)),
                    reply => Ok(reply),
                }
            }
            Err(e) => {
                metrics::record_backend_error("remote_cache");
                Err(e)
            }
        }
    }

    /// Write one command and read its reply within `command_timeout`.
    ///
    /// On error the connection is left in an unknown state and must be dropped.
    async fn roundtrip(
        &self,
        conn: &mut BufReader<TcpStream>,
        args: &[&[u8]],
    ) -> Result<RespValue, CacheError> {
        let exchange = async {
            conn.get_mut().write_all(&encode_command(args)).await?;
            let reply = read_value(&mut *conn).await?;
            Ok::<_, CacheError>(reply)
        };
        match timeout(self.config.command_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                let command = args.first().map(|c| String::from_utf8_lossy(c).into_owned());
                Err(CacheError::Timeout(command.unwrap_or_default()))
            }
        }
    }
}

fn expect_ok(command: &'static str, reply: RespValue) -> Result<(), CacheError> {
    match reply {
        RespValue::Simple(ref s) if s == "OK" => Ok(()),
        RespValue::Error(message) => Err(CacheError::Server(message)),
        reply => Err(CacheError::UnexpectedReply { command, reply }),
    }
}

#[async_trait]
impl CacheService for RemoteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = match self.command(&[b"GET", key.as_bytes()]).await? {
            RespValue::Bulk(Some(bytes)) => Some(
                String::from_utf8(bytes.to_vec()).map_err(|_| CacheError::InvalidUtf8(key.to_string()))?,
            ),
            RespValue::Bulk(None) | RespValue::Array(None) => None,
            reply => return Err(CacheError::UnexpectedReply { command: "GET", reply }),
        };
        metrics::record_cache_lookup(self.kind(), value.is_some());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        let reply = match ttl_secs.filter(|secs| *secs > 0) {
            Some(secs) => {
                let secs = secs.to_string();
                self.command(&[b"SET", key.as_bytes(), value.as_bytes(), b"EX", secs.as_bytes()])
                    .await?
            }
            None => self.command(&[b"SET", key.as_bytes(), value.as_bytes()]).await?,
        };
        expect_ok("SET", reply)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        match self.command(&[b"DEL", key.as_bytes()]).await? {
            RespValue::Integer(_) => Ok(()),
            reply => Err(CacheError::UnexpectedReply { command: "DEL", reply }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        match self.command(&[b"EXISTS", key.as_bytes()]).await? {
            RespValue::Integer(n) => Ok(n > 0),
            reply => Err(CacheError::UnexpectedReply { command: "EXISTS", reply }),
        }
    }

    async fn close(&self) -> Result<(), CacheError> {
        let Some(mut conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let result = self.roundtrip(&mut conn, &[b"QUIT"]).await;
        let _ = conn.get_mut().shutdown().await;
        result.map(|_| ())
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Single-threaded fake store answering GET/SET/DEL/EXISTS/AUTH/QUIT.
    async fn fake_store(password: Option<&'static str>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        let data: Store = Arc::default();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let data = Arc::clone(&data);
                tokio::spawn(async move {
                    let mut conn = BufReader::new(socket);
                    let mut authed = password.is_none();
                    while let Ok(RespValue::Array(Some(args))) = read_value(&mut conn).await {
                        let args: Vec<Vec<u8>> = args
                            .into_iter()
                            .filter_map(|a| match a {
                                RespValue::Bulk(Some(b)) => Some(b.to_vec()),
                                _ => None,
                            })
                            .collect();
                        if args[0].eq_ignore_ascii_case(b"QUIT") {
                            let _ = conn.get_mut().write_all(b"+OK\r\n").await;
                            break;
                        }
                        let reply = respond(&data, &args, &mut authed, password);
                        if conn.get_mut().write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (addr, connections)
    }

    type Store = Arc<std::sync::Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

    fn respond(data: &Store, args: &[Vec<u8>], authed: &mut bool, password: Option<&str>) -> Vec<u8> {
        let cmd = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let mut data = data.lock().unwrap();
        match cmd.as_str() {
            "AUTH" => {
                *authed = password.map(str::as_bytes) == Some(args[1].as_slice());
                if *authed {
                    b"+OK\r\n".to_vec()
                } else {
                    b"-WRONGPASS invalid password\r\n".to_vec()
                }
            }
            _ if !*authed => b"-NOAUTH Authentication required.\r\n".to_vec(),
            "SET" => {
                data.insert(args[1].clone(), args[2].clone());
                b"+OK\r\n".to_vec()
            }
            "GET" => match data.get(&args[1]) {
                Some(v) => [format!("${}\r\n", v.len()).into_bytes(), v.clone(), b"\r\n".to_vec()].concat(),
                None => b"$-1\r\n".to_vec(),
            },
            "DEL" => format!(":{}\r\n", data.remove(&args[1]).is_some() as i64).into_bytes(),
            "EXISTS" => format!(":{}\r\n", data.contains_key(&args[1]) as i64).into_bytes(),
            _ => b"-ERR unknown command\r\n".to_vec(),
        }
    }

    fn config(addr: SocketAddr, password: Option<&str>) -> RemoteConfig {
        RemoteConfig {
            address: addr.to_string(),
            password: password.map(str::to_string),
            db: None,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(2),
        }
    }

    /// Accepts connections and reads commands without ever replying.
    async fn silent_store() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_connection() {
        let (addr, connections) = fake_store(None).await;
        let cache = RemoteCache::new(config(addr, None));
        assert!(!cache.is_connected().await);
        assert_eq!(connections.load(Ordering::SeqCst), 0);

        cache.set("k", "v", Some(30)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());
        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());

        assert_eq!(connections.load(Ordering::SeqCst), 1);
        cache.close().await.unwrap();
        assert!(!cache.is_connected().await);
    }

    #[tokio::test]
    async fn authenticates_on_connect() {
        let (addr, _) = fake_store(Some("hunter2")).await;
        let cache = RemoteCache::new(config(addr, Some("hunter2")));
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        let rejected = RemoteCache::new(config(addr, Some("wrong")));
        assert!(matches!(rejected.get("k").await, Err(CacheError::Server(_))));
    }

    #[tokio::test]
    async fn unreachable_store_fails_per_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cache = RemoteCache::new(config(addr, None));
        assert!(matches!(cache.get("k").await, Err(CacheError::Connect { .. })));
        assert!(!cache.is_connected().await);
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn silent_store_times_out_and_drops_connection() {
        let addr = silent_store().await;
        let mut config = config(addr, None);
        config.command_timeout = Duration::from_millis(100);
        let cache = RemoteCache::new(config);

        let result = tokio::time::timeout(Duration::from_secs(5), cache.get("k")).await;
        match result {
            Ok(Err(CacheError::Timeout(command))) => assert_eq!(command, "GET"),
            other => panic!("expected command timeout, got {other:?}"),
        }
        assert!(!cache.is_connected().await);

        let result = tokio::time::timeout(Duration::from_secs(5), cache.exists("k")).await;
        assert!(matches!(result, Ok(Err(CacheError::Timeout(_)))));
    }

    #[tokio::test]
    async fn silent_store_reads_as_miss_through_tiered_cache() {
        use crate::cache::{LocalCache, TieredCache};
        use crate::observability::Logger;

        let addr = silent_store().await;
        let mut config = config(addr, None);
        config.command_timeout = Duration::from_millis(100);
        let remote = RemoteCache::new(config);
        let cache = TieredCache::new(LocalCache::new(Duration::from_secs(60)), Some(Box::new(remote)), Logger::none());

        let result = tokio::time::timeout(Duration::from_secs(5), cache.get("owners:wf")).await;
        assert_eq!(result.unwrap().unwrap(), None);
    }
}
