use crate::app::create_app;
use crate::clock::SystemClock;
use crate::configs::Settings;
use crate::errors::AppError;

pub mod app;
pub mod clock;
pub mod configs;
pub mod errors;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod tests;

pub async fn run(settings: &Settings, clock: SystemClock) -> Result<(), AppError> {
    let app = create_app(settings, clock)?;

    tokio::signal::ctrl_c().await?;

    app.stop().await
}
