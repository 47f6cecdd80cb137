use nexus_core::Config;

// mimalloc keeps fragmentation low for long-running musl container builds.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = nexus_api::setup::initialize_app(config).await?;

    nexus_api::setup::server::start_server(state, router).await?;

    Ok(())
}
