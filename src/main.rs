use radgate::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::from_env()?;
    radgate::init_tracing(&config);
    radgate::run(config).await
}
