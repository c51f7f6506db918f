//! Synthetic job-queue client for exercising the proxy.
//!
//! Sends `EVAL` job submissions shaped like a queue library's add-job call
//! (data object, options object with a priority, bare priority argument) at a
//! fixed rate and reports throughput.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use priority_proxy::cache::resp::{encode_command, read_value, RespValue};

const ADD_JOB_SCRIPT: &str = "return redis.call('ZADD', KEYS[1], ARGV[5], ARGV[1])";

#[derive(Parser, Debug)]
#[command(name = "load-client", about = "Send synthetic job submissions through the proxy")]
struct Args {
    /// Proxy (or backend) host.
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 6379)]
    port: u16,

    #[arg(long)]
    password: Option<String>,

    /// Target submissions per minute.
    #[arg(long, default_value_t = 10)]
    ops_per_minute: u32,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,

    /// Queue name used in the target key.
    #[arg(long, default_value = "COUCOU")]
    queue: String,
}

#[derive(Debug, Default)]
struct Stats {
    total: u64,
    success: u64,
    errors: u64,
}

impl Stats {
    fn report(&self, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            total = self.total,
            success = self.success,
            errors = self.errors,
            rate = format!("{:.2}", self.total as f64 / elapsed),
            "Load client progress"
        );
    }
}

fn random_string(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric).take(len).collect()
}

/// One add-job command; priorities cycle through 100..=199 so the rewritten
/// value keeps its digit count.
fn add_job(queue: &str, sequence: u64) -> Vec<u8> {
    let data = json!({
        "workflowId": format!("wf_{}", random_string(10)),
        "executionId": random_string(15),
        "loadStaticData": true,
        "pushRef": "main",
        "streamingEnabled": true,
    });
    let priority = 100 + sequence % 100;
    let options = json!({
        "priority": priority,
        "removeOnComplete": true,
        "removeOnFail": true,
    });
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let key = format!("bull:{queue}:priority");
    encode_command(&[
        "EVAL".to_string(),
        ADD_JOB_SCRIPT.to_string(),
        "1".to_string(),
        key,
        data.to_string(),
        options.to_string(),
        timestamp.to_string(),
        "0".to_string(),
        priority.to_string(),
    ])
}

async fn send(conn: &mut BufReader<TcpStream>, command: &[u8]) -> Result<RespValue, Box<dyn std::error::Error>> {
    conn.get_mut().write_all(command).await?;
    match read_value(conn).await? {
        RespValue::Error(message) => Err(message.into()),
        reply => Ok(reply),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("load_client=info")))
        .init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    tracing::info!(
        address = %address,
        ops_per_minute = args.ops_per_minute,
        duration_secs = args.duration_secs,
        "Load client starting"
    );

    let mut conn = BufReader::new(TcpStream::connect(&address).await?);
    if let Some(password) = &args.password {
        send(&mut conn, &encode_command(&["AUTH", password.as_str()])).await?;
    }

    let period = Duration::from_secs(60) / args.ops_per_minute.max(1);
    let mut ticker = tokio::time::interval(period);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration_secs);
    let started = Instant::now();
    let mut stats = Stats::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        }

        stats.total += 1;
        match send(&mut conn, &add_job(&args.queue, stats.total)).await {
            Ok(reply) => {
                stats.success += 1;
                tracing::debug!(?reply, "Job submitted");
            }
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(error = %e, "Job submission failed");
            }
        }
        if stats.total % 100 == 0 {
            stats.report(started);
        }
    }

    stats.report(started);
    let _ = send(&mut conn, &encode_command(&["QUIT"])).await;
    Ok(())
}
