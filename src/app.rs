//! Production wiring of the lifecycle steps. Collaborators are constructed
//! here and passed down explicitly; nothing in the crate is a process-wide
//! global.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::dispatching::DefaultKey;
use teloxide::prelude::*;
use tokio::sync::Mutex;
use url::Url;

use crate::bot;
use crate::cache::RedisCache;
use crate::config::Config;
use crate::jobs::Scheduler;
use crate::lifecycle::Lifecycle;
use crate::notify;
use crate::storage::Storage;
use crate::throttle::Throttle;
use crate::webhook::{self, QueueReceiver, QueueSink};

type BotDispatcher = Dispatcher<Bot, teloxide::RequestError, DefaultKey>;

pub struct App {
    config: Config,
    bot: Bot,
    cache: RedisCache,
    scheduler: Mutex<Scheduler>,
    // Filled by the startup steps, in order
    storage: Mutex<Option<Storage>>,
    throttle: Mutex<Option<Arc<Throttle>>>,
    runtime: Mutex<Option<(BotDispatcher, QueueSink, QueueReceiver)>>,
}

impl App {
    /// Construct the collaborators. Nothing here touches the network: the
    /// Redis client is lazy and the bot client only sends once startup runs.
    pub async fn new(config: Config) -> Result<Self> {
        let bot = Bot::new(&config.telegram.bot_token);
        let cache = RedisCache::new(&config.redis.url)?;
        let scheduler = Scheduler::new().await?;
        Ok(Self {
            config,
            bot,
            cache,
            scheduler: Mutex::new(scheduler),
            storage: Mutex::new(None),
            throttle: Mutex::new(None),
            runtime: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hand the built dispatcher and queue halves to `main`. Consumes the
    /// slot; valid exactly once, after `register_routes` has run.
    pub async fn take_runtime(&self) -> Result<(BotDispatcher, QueueSink, QueueReceiver)> {
        self.runtime
            .lock()
            .await
            .take()
            .context("routes were never registered")
    }
}

#[async_trait]
impl Lifecycle for App {
    async fn start_scheduler(&self) -> Result<()> {
        let scheduler = self.scheduler.lock().await;
        scheduler.register_heartbeat().await?;
        scheduler.start().await
    }

    async fn init_database(&self) -> Result<()> {
        let storage = Storage::open(&self.config.storage.database_path)?;
        *self.storage.lock().await = Some(storage);
        Ok(())
    }

    async fn ping_cache(&self) -> Result<()> {
        self.cache.ping().await
    }

    async fn register_webhook(&self) -> Result<()> {
        let url = Url::parse(&self.config.webhook.public_url)
            .context("Invalid webhook.public_url")?;
        self.bot
            .set_webhook(url)
            .await
            .context("setWebhook call failed")?;
        Ok(())
    }

    async fn attach_throttling(&self) -> Result<()> {
        let throttle = Throttle::new(self.cache.clone(), &self.config.throttle);
        *self.throttle.lock().await = Some(throttle);
        Ok(())
    }

    async fn register_commands(&self) -> Result<()> {
        self.bot
            .set_my_commands(bot::default_commands())
            .await
            .context("setMyCommands call failed")?;
        Ok(())
    }

    async fn register_routes(&self) -> Result<()> {
        let storage = self
            .storage
            .lock()
            .await
            .clone()
            .context("database must be initialized before routes")?;
        let throttle = self
            .throttle
            .lock()
            .await
            .clone()
            .context("throttling must be attached before routes")?;

        let dispatcher = bot::build_dispatcher(self.bot.clone(), storage, throttle);
        let (sink, rx) = webhook::update_queue();
        *self.runtime.lock().await = Some((dispatcher, sink, rx));
        Ok(())
    }

    async fn notify_startup(&self) -> Result<()> {
        notify::notify_startup(&self.bot, &self.config.telegram.admin_chat_ids).await
    }

    async fn notify_shutdown(&self) -> Result<()> {
        notify::notify_shutdown(&self.bot, &self.config.telegram.admin_chat_ids).await
    }

    async fn close_client(&self) -> Result<()> {
        self.bot
            .delete_webhook()
            .await
            .context("deleteWebhook call failed")?;
        self.scheduler.lock().await.shutdown().await
    }
}
