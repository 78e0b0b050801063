use workshop_registration::{api, config::Config, telemetry};

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let config = Config::from_env()?;
    let state = api::AppState::from_config(&config)?;
    let app = api::app(state);
    tracing::info!(addr = %config.bind_addr, production = config.production, "listening");
    app.listen(config.bind_addr.to_string()).await?;
    Ok(())
}
