//! HTML message rendering for lifecycle events
//!
//! Messages target the chat transport's HTML parse mode, so any free text
//! coming from outside (error messages) is escaped.

use crate::tracker::{LifecycleEvent, Signal, TakeProfitLevel};

/// Render the notification for an event, if it is broadcast at all
///
/// Breakout detections and watch expiries are internal bookkeeping and only
/// go to the log.
pub fn format_event(event: &LifecycleEvent) -> Option<String> {
    match event {
        LifecycleEvent::BreakoutDetected { .. } | LifecycleEvent::WatchExpired { .. } => None,
        LifecycleEvent::SignalIssued { signal } => Some(format_new_signal(signal)),
        LifecycleEvent::Triggered { signal, price } => Some(format!(
            "🔥 <b>SIGNAL TRIGGERED!</b>\n\n\
             📊 <b>{}</b>\n\
             💰 <b>Entry:</b> {:.2} ₽\n\
             📈 <b>Current price:</b> {:.2} ₽\n\n\
             Position is open. Watch the TP levels.",
            signal.symbol, signal.entry_price, price
        )),
        LifecycleEvent::TakeProfitHit {
            signal,
            level,
            price,
        } => Some(format!(
            "🎯 <b>{} REACHED!</b>\n\n\
             📊 <b>{}</b>\n\
             💰 <b>{}:</b> {:.2} ₽\n\
             📈 <b>Current price:</b> {:.2} ₽\n\n\
             {}",
            level.label(),
            signal.symbol,
            level.label(),
            signal.take_profit(*level),
            price,
            management_instruction(*level)
        )),
        LifecycleEvent::StoppedOut { signal, price } => Some(format!(
            "🛑 <b>STOP LOSS HIT</b>\n\n\
             📊 <b>{}</b>\n\
             🛑 <b>Stop:</b> {:.2} ₽\n\
             📉 <b>Current price:</b> {:.2} ₽\n\n\
             Close the remaining position.",
            signal.symbol, signal.stop_loss, price
        )),
        LifecycleEvent::SignalExpired { signal } => Some(format!(
            "⌛ <b>SIGNAL EXPIRED</b>\n\n\
             📊 <b>{}</b>\n\
             🎯 <b>Entry:</b> {:.2} ₽\n\
             ⏰ <b>Issued:</b> {}\n\n\
             No longer tracked.",
            signal.symbol,
            signal.entry_price,
            signal.signal_time.format("%H:%M:%S %d.%m.%Y")
        )),
    }
}

fn format_new_signal(signal: &Signal) -> String {
    let risk = signal.risk_distance();
    let risk_pct = risk / signal.entry_price * 100.0;

    format!(
        "🚀 <b>NEW SIGNAL</b>\n\n\
         📊 <b>Instrument:</b> {symbol}\n\
         ⏰ <b>Time:</b> {time}\n\n\
         💡 <b>Setup:</b> EMA breakout on volume, retest of the average at {low:.2}\n\n\
         📈 <b>Trade parameters:</b>\n\
         🎯 <b>Entry:</b> {entry:.2} ₽\n\
         🛑 <b>Stop Loss:</b> {stop:.2} ₽\n\
         💰 <b>Risk:</b> {risk:.2} ₽ ({risk_pct:.1}%)\n\n\
         🎯 <b>Take Profit:</b>\n\
         • <b>TP1 (1/3):</b> {tp1:.2} ₽ | R/R: 1:{rr1}\n\
         • <b>TP2 (1/3):</b> {tp2:.2} ₽ | R/R: 1:{rr2}\n\
         • <b>TP3 (1/3):</b> {tp3:.2} ₽ | R/R: 1:{rr3}\n\n\
         📋 <b>Position management:</b>\n\
         1️⃣ At TP1 → close 1/3, move SL to break-even\n\
         2️⃣ At TP2 → close 1/3, move SL to TP1\n\
         3️⃣ At TP3 → close the rest\n\n\
         #TradingSignal #{symbol}",
        symbol = signal.symbol,
        time = signal.signal_time.format("%H:%M:%S %d.%m.%Y"),
        low = signal.local_low,
        entry = signal.entry_price,
        stop = signal.stop_loss,
        risk = risk,
        risk_pct = risk_pct,
        tp1 = signal.take_profit_1,
        tp2 = signal.take_profit_2,
        tp3 = signal.take_profit_3,
        rr1 = signal.risk_reward_1,
        rr2 = signal.risk_reward_2,
        rr3 = signal.risk_reward_3,
    )
}

fn management_instruction(level: TakeProfitLevel) -> &'static str {
    match level {
        TakeProfitLevel::Tp1 => "Close 1/3 of the position and move SL to break-even!",
        TakeProfitLevel::Tp2 => "Close another 1/3 and move SL to TP1!",
        TakeProfitLevel::Tp3 => "Close the rest of the position. Trade complete!",
    }
}

pub fn format_startup(instrument_count: usize) -> String {
    format!(
        "🤖 <b>Signal bot started</b>\n\nScanning {} instruments. Send /help for commands.",
        instrument_count
    )
}

pub fn format_error(error: &str) -> String {
    format!("⚠️ <b>Bot error:</b> {}", escape_html(error))
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
