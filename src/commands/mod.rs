use crate::api::TelegramClient;
use crate::config::TradingHours;
use crate::models::RecipientId;
use crate::notify::format::escape_html;
use crate::notify::SubscriberSet;
use crate::tracker::{LifecycleTracker, SignalStage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

const HELP_TEXT: &str = "🤖 <b>Breakout retest signal bot</b>\n\n\
    /start - subscribe to signals\n\
    /stop - unsubscribe\n\
    /status - bot and market status\n\
    /signals - active signals\n\
    /breakouts - breakouts waiting for a retest\n\
    /help - this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Signals,
    Breakouts,
    Help,
    Unknown(String),
}

impl Command {
    /// Parse a chat message; plain text that is not a command yields `None`
    ///
    /// Accepts the `/command@botname` form used in group chats.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "signals" => Command::Signals,
            "breakouts" => Command::Breakouts,
            "help" => Command::Help,
            _ => Command::Unknown(name),
        })
    }
}

/// Answers chat commands from the shared tracker and subscriber state
#[derive(Clone)]
pub struct CommandHandler {
    tracker: Arc<RwLock<LifecycleTracker>>,
    subscribers: Arc<RwLock<SubscriberSet>>,
    trading_hours: TradingHours,
}

impl CommandHandler {
    pub fn new(
        tracker: Arc<RwLock<LifecycleTracker>>,
        subscribers: Arc<RwLock<SubscriberSet>>,
        trading_hours: TradingHours,
    ) -> Self {
        Self {
            tracker,
            subscribers,
            trading_hours,
        }
    }

    pub async fn handle(&self, chat_id: RecipientId, command: &Command) -> String {
        self.handle_at(chat_id, command, Utc::now()).await
    }

    /// Produce the reply to `command` as of `now`
    pub async fn handle_at(
        &self,
        chat_id: RecipientId,
        command: &Command,
        now: DateTime<Utc>,
    ) -> String {
        match command {
            Command::Start => {
                if self.subscribers.write().await.subscribe(chat_id) {
                    tracing::info!(chat_id, "➕ New subscriber");
                }
                format!(
                    "✅ Subscribed. You will receive breakout retest signals.\n\n{}",
                    HELP_TEXT
                )
            }
            Command::Stop => {
                if self.subscribers.write().await.unsubscribe(chat_id) {
                    tracing::info!(chat_id, "➖ Subscriber left");
                }
                "👋 Unsubscribed. Send /start to subscribe again.".to_string()
            }
            Command::Status => self.status(chat_id, now).await,
            Command::Signals => self.signals().await,
            Command::Breakouts => self.breakouts(now).await,
            Command::Help => HELP_TEXT.to_string(),
            Command::Unknown(name) => {
                format!("❓ Unknown command /{}\n\n{}", escape_html(name), HELP_TEXT)
            }
        }
    }

    async fn status(&self, chat_id: RecipientId, now: DateTime<Utc>) -> String {
        let (subscribed, subscriber_count) = {
            let subscribers = self.subscribers.read().await;
            (subscribers.contains(chat_id), subscribers.len())
        };
        let (watches, signals) = {
            let tracker = self.tracker.read().await;
            (tracker.watches().len(), tracker.signals().len())
        };
        let market = if self.trading_hours.contains(now) {
            "🟢 open"
        } else {
            "🔴 closed"
        };

        format!(
            "📊 <b>Status</b>\n\n\
             Market: {} ({:02}:00-{:02}:59 UTC)\n\
             Breakouts watched: {}\n\
             Active signals: {}\n\
             Subscribers: {}\n\
             You are {}",
            market,
            self.trading_hours.start_hour,
            self.trading_hours.end_hour,
            watches,
            signals,
            subscriber_count,
            if subscribed { "subscribed" } else { "not subscribed" }
        )
    }

    async fn signals(&self) -> String {
        let tracker = self.tracker.read().await;
        let signals = tracker.signals();
        if signals.is_empty() {
            return "📭 No active signals".to_string();
        }

        let mut text = format!("📈 <b>Active signals ({})</b>\n", signals.len());
        for signal in signals {
            let stage = match signal.stage {
                SignalStage::Pending => "waiting for entry",
                SignalStage::Triggered => "triggered",
                SignalStage::Tp1Reached => "TP1 reached",
                SignalStage::Tp2Reached => "TP2 reached",
            };
            text.push_str(&format!(
                "\n<b>{}</b>: entry {:.2}, SL {:.2}, TP {:.2} / {:.2} / {:.2} ({})",
                signal.symbol,
                signal.entry_price,
                signal.stop_loss,
                signal.take_profit_1,
                signal.take_profit_2,
                signal.take_profit_3,
                stage
            ));
        }
        text
    }

    async fn breakouts(&self, now: DateTime<Utc>) -> String {
        let tracker = self.tracker.read().await;
        let watches = tracker.watches();
        if watches.is_empty() {
            return "📭 No breakouts under watch".to_string();
        }

        let mut text = format!("👀 <b>Breakouts under watch ({})</b>\n", watches.len());
        for watch in watches {
            let age_hours = (now - watch.detected_at).num_hours();
            let high = watch
                .local_high
                .map(|h| format!("{:.2}", h))
                .unwrap_or_else(|| "pending".to_string());
            text.push_str(&format!(
                "\n<b>{}</b>: broke {:.2} over EMA {:.2}, high {}, {}h ago",
                watch.symbol, watch.breakout.price, watch.breakout.ema, high, age_hours
            ));
        }
        text
    }
}

/// Long-poll the bot API and answer commands until the task is dropped
pub async fn run_command_loop(client: TelegramClient, handler: CommandHandler, poll_timeout_secs: u64) {
    tracing::info!("💬 Command loop started");
    let mut offset: Option<i64> = None;

    loop {
        let updates = match client.get_updates(offset, poll_timeout_secs).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("⚠️  Failed to poll updates: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(command) = message.text.as_deref().and_then(Command::parse) else {
                continue;
            };

            tracing::debug!(chat_id = message.chat.id, "Command {:?}", command);
            let reply = handler.handle(message.chat.id, &command).await;
            if let Err(e) = client.send_message(message.chat.id, &reply).await {
                tracing::warn!(chat_id = message.chat.id, "⚠️  Failed to reply: {}", e);
            }
        }
    }
}
