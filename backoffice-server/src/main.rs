use backoffice_server::{Config, Server, ServerState, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment and configuration
    dotenv::dotenv().ok();
    let config = Config::from_env();

    // 2. Logging (file output if the log dir exists)
    setup_environment(&config);

    tracing::info!("Backoffice server starting...");

    // 3. Wire components
    let state = ServerState::initialize(&config);

    // 4. Serve (Server::run starts the background worker)
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
