use anyhow::Result;
use teloxide::prelude::*;
use tracing::{info, warn};

/// Tell every admin chat the relay is up.
pub async fn notify_startup(bot: &Bot, admin_chat_ids: &[i64]) -> Result<()> {
    broadcast(bot, admin_chat_ids, "started").await
}

/// Tell every admin chat the relay is going down.
pub async fn notify_shutdown(bot: &Bot, admin_chat_ids: &[i64]) -> Result<()> {
    broadcast(bot, admin_chat_ids, "shutting down").await
}

/// A single unreachable admin chat must not block the rest, so per-chat
/// failures are logged and skipped. Only a total failure is reported.
async fn broadcast(bot: &Bot, admin_chat_ids: &[i64], event: &str) -> Result<()> {
    if admin_chat_ids.is_empty() {
        info!("No admin chats configured, skipping {event} notification");
        return Ok(());
    }

    let text = format!(
        "Webhook relay {event} at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let mut delivered = 0usize;
    for &chat_id in admin_chat_ids {
        match bot.send_message(ChatId(chat_id), text.as_str()).await {
            Ok(_) => delivered += 1,
            Err(e) => warn!("Failed to notify admin chat {chat_id}: {e}"),
        }
    }

    anyhow::ensure!(
        delivered > 0,
        "could not deliver the {event} notification to any admin chat"
    );
    info!("Notified {delivered}/{} admin chats: {event}", admin_chat_ids.len());
    Ok(())
}
