//! Point-to-point self-test: rank 0 sends an arithmetic progression to every
//! other rank over TCP and each receiver checks what arrived.
//!
//! Run one rank per process with `--rank`, or omit it to run the whole
//! group in this process over loopback.

use accel_p2p::verify::{Outcome, run_send_recv};
use accel_p2p::{
    AccelClient, ClientConfig, DataType, EndpointDirectory, GroupContext, Rank, SimDevice, Tag,
    load_endpoints, local_endpoints,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "accel-sndrcv", about = "Send/receive self-test for the accel-p2p client")]
struct Args {
    /// Rank to run. Without it every rank runs in this process.
    #[arg(long)]
    rank: Option<Rank>,

    /// Number of ranks in the group.
    #[arg(long, default_value_t = 2)]
    world_size: u32,

    /// Elements per message.
    #[arg(long, default_value_t = 16)]
    count: usize,

    #[arg(long, default_value_t = 0)]
    tag: Tag,

    /// Rank i listens on base_port + world_size + i (ignored with --endpoints).
    #[arg(long, default_value_t = 5500)]
    base_port: u16,

    /// JSON array of {address|ip, port, session_id, max_segment_size}, one per rank.
    #[arg(long)]
    endpoints: Option<PathBuf>,

    /// Per-operation timeout; defaults to ACCEL_TIMEOUT_MS or 30s.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Element type: f32, f64, i8, i32, i64, u8, u32, u64.
    #[arg(long, default_value = "f32")]
    dtype: DataType,

    /// Exit non-zero when any receiver sees wrong data.
    #[arg(long)]
    strict: bool,
}

async fn run_rank(
    rank: Rank,
    args: Args,
    directory: Arc<EndpointDirectory>,
    config: ClientConfig,
) -> Result<Outcome> {
    let group = GroupContext::new(rank, args.world_size)?;
    let client = AccelClient::connect_tcp(group, directory, Arc::new(SimDevice::new()), config)
        .await
        .with_context(|| format!("rank {rank}: client setup"))?;
    if let Some(ms) = args.timeout_ms {
        client.set_timeout(Duration::from_millis(ms))?;
    }

    let (count, tag) = (args.count, args.tag);
    let outcome = match args.dtype {
        DataType::F32 => run_send_recv::<f32>(&client, count, tag).await,
        DataType::F64 => run_send_recv::<f64>(&client, count, tag).await,
        DataType::I8 => run_send_recv::<i8>(&client, count, tag).await,
        DataType::I32 => run_send_recv::<i32>(&client, count, tag).await,
        DataType::I64 => run_send_recv::<i64>(&client, count, tag).await,
        DataType::U8 => run_send_recv::<u8>(&client, count, tag).await,
        DataType::U32 => run_send_recv::<u32>(&client, count, tag).await,
        DataType::U64 => run_send_recv::<u64>(&client, count, tag).await,
    }
    .with_context(|| format!("rank {rank}: exchange"))?;

    client.deinit().await?;
    Ok(outcome)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let entries = match &args.endpoints {
        Some(path) => load_endpoints(path)
            .with_context(|| format!("loading endpoints from {}", path.display()))?,
        None => local_endpoints(args.world_size, args.base_port)?,
    };
    let directory = Arc::new(EndpointDirectory::new(entries, args.world_size)?);
    let config = ClientConfig::from_env();

    let ranks: Vec<Rank> = match args.rank {
        Some(rank) => {
            if rank >= args.world_size {
                bail!("--rank {rank} is outside a world of {}", args.world_size);
            }
            vec![rank]
        }
        None => (0..args.world_size).collect(),
    };

    let mut handles = Vec::with_capacity(ranks.len());
    for rank in ranks {
        handles.push(tokio::spawn(run_rank(
            rank,
            args.clone(),
            Arc::clone(&directory),
            config.clone(),
        )));
    }

    let mut all_passed = true;
    for handle in handles {
        let outcome = handle.await.context("rank task panicked")??;
        if let Some(line) = outcome.report_line() {
            println!("{line}");
        }
        all_passed &= outcome.passed();
    }

    if args.strict && !all_passed {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
