mod cli;

use anyhow::Result;
use chunkstream::{ChunkPlan, ChunkPolicy, config, parse_range, server};
use clap::Parser;
use cli::{Cli, Commands};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "chunkstream=trace,tower_http=debug".to_string()
        } else {
            "chunkstream=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config::validate_config(&config)?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config))
        }
        Commands::Plan {
            size,
            range,
            chunk_size,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let policy = match chunk_size {
                Some(size) if size > 0 => ChunkPolicy::Fixed(size),
                Some(_) => anyhow::bail!("Chunk size cannot be 0"),
                None => config.stream.policy(),
            };
            print_plan(size, range.as_deref(), policy)
        }
        Commands::CheckConfig => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            println!("Configuration is valid");
            println!("  listen:   {}:{}", config.server.host, config.server.port);
            println!("  policy:   {:?}", config.stream.policy());
            println!("  backends: {}", config.backends.len());
            for (index, backend) in config.backends.iter().enumerate() {
                println!("    [{index}] {backend:?}");
            }
            Ok(())
        }
        Commands::Version => {
            println!("chunkstream {}", chunkstream::VERSION);
            Ok(())
        }
    }
}

async fn serve(config: config::Config) -> Result<()> {
    tracing::info!("Starting chunkstream {}", chunkstream::VERSION);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
        }
        signal.cancel();
    });

    server::run(&config, shutdown).await
}

fn print_plan(size: u64, range: Option<&str>, policy: ChunkPolicy) -> Result<()> {
    let (range, kind) = parse_range(range, size)?;
    let plan = ChunkPlan::new(range, size, policy)?;

    println!("range:          {}-{} ({:?}, {} bytes)", range.from, range.until, kind, range.byte_count());
    println!("chunk size:     {}", plan.chunk_size);
    println!("offset:         {}", plan.offset);
    println!("parts:          {}", plan.part_count);
    println!("first part cut: {}", plan.first_part_cut);
    println!("last part cut:  {}", plan.last_part_cut);
    for i in 0..plan.part_count {
        let (offset, length) = plan.window(i);
        println!("  window {i}: offset {offset}, length {length}");
    }
    Ok(())
}
