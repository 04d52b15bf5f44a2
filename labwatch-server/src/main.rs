use anyhow::Context;
use labwatch_server::clock::SystemClock;
use labwatch_server::configs::Settings;
use labwatch_server::run;

fn main() -> anyhow::Result<()> {
    // The local offset can only be read while the process is single-threaded
    let clock = SystemClock::local();

    let settings = Settings::new().context("Failed to load settings.")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
            let level = settings.logger.level.as_str();

            format!("{app_name}={level}").into()
        }))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime.")?;

    runtime.block_on(run(&settings, clock))?;

    Ok(())
}
