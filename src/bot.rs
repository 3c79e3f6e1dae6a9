//! Dispatch tree and message handlers. The dispatcher consumes updates from
//! the webhook queue; the throttle guard sits as an outer filter on the
//! message branch, mirroring where the rate limit belongs: before any handler.

use std::sync::Arc;

use teloxide::dispatching::DefaultKey;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, warn};

use crate::storage::{BotUser, Storage};
use crate::throttle::Throttle;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "register and say hello.")]
    Start,
    #[command(description = "show this help message.")]
    Help,
}

/// Default command list registered with Telegram at startup.
pub fn default_commands() -> Vec<teloxide::types::BotCommand> {
    Command::bot_commands()
}

/// Build the dispatcher over the full handler tree.
pub fn build_dispatcher(
    bot: Bot,
    storage: Storage,
    throttle: Arc<Throttle>,
) -> Dispatcher<Bot, teloxide::RequestError, DefaultKey> {
    let handler = Update::filter_message()
        .filter_async(move |msg: Message| {
            let throttle = throttle.clone();
            async move {
                match msg.from.as_ref() {
                    Some(user) => throttle.admit(user.id.0).await,
                    // Channel posts and the like carry no sender; let them pass
                    None => true,
                }
            }
        })
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![storage])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("relaybot"))
        .enable_ctrlc_handler()
        .build()
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    storage: Storage,
) -> ResponseResult<()> {
    record_sender(&storage, &msg).await;

    match cmd {
        Command::Start => {
            bot.send_message(
                msg.chat.id,
                "Hello! I'm up and relaying updates. Send /help for the command list.",
            )
            .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
    }
    Ok(())
}

async fn handle_message(msg: Message, storage: Storage) -> ResponseResult<()> {
    record_sender(&storage, &msg).await;
    debug!("Ignoring non-command message in chat {}", msg.chat.id);
    Ok(())
}

/// Keep the user registry fresh; a storage hiccup must not fail the handler.
async fn record_sender(storage: &Storage, msg: &Message) {
    let Some(user) = msg.from.as_ref() else {
        return;
    };
    let row = BotUser {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    };
    if let Err(e) = storage.upsert_user(&row).await {
        warn!("Failed to record user {}: {e:#}", user.id);
    }
}
