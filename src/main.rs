#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use tpm_gate::server;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "tpm-gate", about = "Distributed token-per-minute rate limiter for LLM APIs")]
struct Cli {
    /// Path to the gate's config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the admission listen address from the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the admin API listen address (health/ready/metrics) from the config file
    #[arg(long)]
    admin_listen: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("server: failed to start tokio runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: cli.listen,
        admin_listen: cli.admin_listen,
    }));

    // §6 exit codes: 0 clean shutdown, 1 bad config/startup, 2 coordination
    // store unreachable after the connect-retry budget is exhausted.
    match result {
        Ok(()) => ExitCode::from(0),
        Err(server::bootstrap::BootstrapError::Config(e)) => {
            eprintln!("server: startup failed: {}", e);
            ExitCode::from(1)
        }
        Err(server::bootstrap::BootstrapError::Coordination(e)) => {
            eprintln!("server: coordination store unreachable: {}", e);
            ExitCode::from(2)
        }
    }
}
