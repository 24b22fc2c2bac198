mod config;
mod topics;

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use config::Config;

const HELP_TEXT: &str = "\
🤖 Hi! I'm the Planning Poker bot.\n\n\
Join a session with your role token:\n\
• /join <token>\n\n\
Roles:\n\
• Participants and leads vote\n\
• Administrators don't vote\n\
• Leads run the session";

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("pokerbot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting pokerbot...");
    info!(
        "Topic policies loaded for {} chat(s)",
        config.supported_topics.len()
    );
    if config.supported_topics.is_empty() {
        warn!("SUPPORTED_TOPICS is empty or malformed; topic messages in every chat will be ignored");
    }
    let dropped_entries = config.supported_topics.dropped_entries();
    let dropped_values = config.supported_topics.dropped_values();
    if dropped_entries > 0 || dropped_values > 0 {
        warn!(
            "SUPPORTED_TOPICS had malformed data: dropped {dropped_entries} entry(ies) and {dropped_values} value(s)"
        );
    }

    let bot = Bot::new(&config.bot_token);
    let config = Arc::new(config);

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Handler tree: new and edited messages both go through the same
/// topic gate and command handling.
fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_edited_message().endpoint(handle_message))
}

async fn handle_message(bot: Bot, msg: Message, config: Arc<Config>) -> ResponseResult<()> {
    if !matches!(msg.chat.kind, ChatKind::Public(_)) {
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let topic_id = msg.thread_id.map(|t| t.0 .0 as i64);

    if !config.is_supported_thread(chat_id, topic_id) {
        debug!("Ignoring update for unsupported chat {chat_id} topic {topic_id:?}");
        return Ok(());
    }

    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");
    let reply = match command {
        "/start" | "/help" => HELP_TEXT.to_string(),
        "/join" => {
            let token = match (parts.next(), parts.next()) {
                (Some(token), None) => token,
                _ => {
                    send_reply(&bot, &msg, "❌ Usage: /join <token>").await;
                    return Ok(());
                }
            };
            match config.resolve_role(token) {
                Some(role) => {
                    let user = msg
                        .from
                        .as_ref()
                        .map(|u| u.id.0 as i64)
                        .unwrap_or_default();
                    info!("User {user} joined chat {chat_id} topic {topic_id:?} as {role}");
                    format!("👋 Welcome! Your role: {}", role.label())
                }
                None => "❌ Invalid token.".to_string(),
            }
        }
        _ => return Ok(()),
    };

    send_reply(&bot, &msg, &reply).await;
    Ok(())
}

/// Send a reply into the same topic the message came from.
async fn send_reply(bot: &Bot, msg: &Message, text: &str) {
    let mut request = bot.send_message(msg.chat.id, text);
    if let Some(thread_id) = msg.thread_id {
        request = request.message_thread_id(thread_id);
    }
    if let Err(e) = request.await {
        warn!("Failed to send reply: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;

    fn test_config() -> Arc<Config> {
        Arc::new(
            Config::from_lookup(|name| match name {
                "BOT_TOKEN" => Some("123456789:TESTTOKEN".to_string()),
                "SUPPORTED_TOPICS" => Some(r#"{"-100999": [5]}"#.to_string()),
                _ => None,
            })
            .expect("test config should load"),
        )
    }

    fn update_from_json(raw: &str) -> Update {
        serde_json::from_str(raw).expect("update json should deserialize")
    }

    async fn dispatch(update: Update) -> ControlFlow<ResponseResult<()>, dptree::di::DependencyMap> {
        let bot = Bot::new("123456789:TESTTOKEN");
        schema()
            .dispatch(dptree::deps![update, bot, test_config()])
            .await
    }

    #[tokio::test]
    async fn test_schema_routes_messages() {
        let update = update_from_json(
            r#"{"update_id": 1, "message": {"message_id": 10, "date": 1, "chat": {"id": -100999, "type": "supergroup", "title": "poker"}, "message_thread_id": 5, "is_topic_message": true, "from": {"id": 7, "is_bot": false, "first_name": "Ann"}, "text": "hello"}}"#,
        );
        let result = dispatch(update).await;
        assert!(matches!(result, ControlFlow::Break(Ok(()))));
    }

    #[tokio::test]
    async fn test_schema_routes_edited_messages() {
        let update = update_from_json(
            r#"{"update_id": 2, "edited_message": {"message_id": 10, "date": 1, "edit_date": 2, "chat": {"id": -100999, "type": "supergroup", "title": "poker"}, "message_thread_id": 5, "is_topic_message": true, "from": {"id": 7, "is_bot": false, "first_name": "Ann"}, "text": "hello again"}}"#,
        );
        let result = dispatch(update).await;
        assert!(matches!(result, ControlFlow::Break(Ok(()))));
    }

    #[tokio::test]
    async fn test_schema_ignores_channel_posts() {
        let update = update_from_json(
            r#"{"update_id": 3, "channel_post": {"message_id": 10, "date": 1, "chat": {"id": -100123, "type": "channel", "title": "news"}, "text": "announcement"}}"#,
        );
        let result = dispatch(update).await;
        assert!(matches!(result, ControlFlow::Continue(_)));
    }
}
