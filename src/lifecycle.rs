//! Ordered bootstrap and teardown. Each step is a named method on the
//! [`Lifecycle`] trait so tests can substitute fakes and assert call order;
//! the production implementation lives in [`crate::app`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start_scheduler(&self) -> Result<()>;
    async fn init_database(&self) -> Result<()>;
    async fn ping_cache(&self) -> Result<()>;
    async fn register_webhook(&self) -> Result<()>;
    async fn attach_throttling(&self) -> Result<()>;
    async fn register_commands(&self) -> Result<()>;
    async fn register_routes(&self) -> Result<()>;
    async fn notify_startup(&self) -> Result<()>;

    async fn notify_shutdown(&self) -> Result<()>;
    async fn close_client(&self) -> Result<()>;
}

/// Run the eight startup steps in order, failing fast on the first error.
/// A failed cache ping in particular aborts the whole startup: running
/// without throttling storage is not an acceptable degraded mode.
pub async fn run_startup(hooks: &dyn Lifecycle) -> Result<()> {
    info!("Startup 1/8: starting scheduler");
    hooks.start_scheduler().await.context("start_scheduler failed")?;

    info!("Startup 2/8: initializing database");
    hooks.init_database().await.context("init_database failed")?;

    info!("Startup 3/8: pinging cache");
    hooks.ping_cache().await.context("ping_cache failed")?;

    info!("Startup 4/8: registering webhook");
    hooks.register_webhook().await.context("register_webhook failed")?;

    info!("Startup 5/8: attaching throttling middleware");
    hooks.attach_throttling().await.context("attach_throttling failed")?;

    info!("Startup 6/8: registering default commands");
    hooks.register_commands().await.context("register_commands failed")?;

    info!("Startup 7/8: registering routes");
    hooks.register_routes().await.context("register_routes failed")?;

    info!("Startup 8/8: notifying admins");
    hooks.notify_startup().await.context("notify_startup failed")?;

    info!("Startup complete");
    Ok(())
}

/// Notify admins, then release the client. A failed notification never
/// prevents teardown.
pub async fn run_shutdown(hooks: &dyn Lifecycle) -> Result<()> {
    if let Err(e) = hooks.notify_shutdown().await {
        warn!("Shutdown notification failed: {e:#}");
    }
    hooks.close_client().await.context("close_client failed")?;
    info!("Shutdown complete");
    Ok(())
}
