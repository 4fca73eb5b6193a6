use tournament_scheduler::server::{self, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = std::env::var("SCHEDULER_BIND_ADDR")
        .unwrap_or_else(|_| server::DEFAULT_BIND_ADDR.to_string());
    let config = ServerConfig::from_env();

    if let Err(e) = server::run_server(&addr, config).await {
        log::error!("Server on {addr} stopped: {e}");
        std::process::exit(1);
    }
}
