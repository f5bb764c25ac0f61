//! Idle detection and call grouping
//!
//! Pure functions over a newest-first history of displayable calls.
//!
//! - Idle: forced, or no history, or the newest call is at least
//!   `idle_seconds` old.
//! - Group: the newest call, plus the one before it when both arrived within
//!   [`GROUP_WINDOW_MS`] of each other and the older one is younger than
//!   [`DUAL_KEEP_MS`].
//! - Recent: up to [`RECENT_LIMIT`] calls not in the group, newest first.

use chamador_common::model::{sort_newest_first, CallEvent};

/// Two calls this close together are shown side by side
pub const GROUP_WINDOW_MS: i64 = 30_000;
/// A pair collapses to one card once its older call is this old
pub const DUAL_KEEP_MS: i64 = 60_000;
/// Chips in the "already called" strip
pub const RECENT_LIMIT: usize = 2;

/// Displayable calls (no tests, no recalls), newest first
pub fn filter_history(events: &[CallEvent]) -> Vec<CallEvent> {
    let mut history: Vec<CallEvent> = events
        .iter()
        .filter(|e| e.is_displayable())
        .cloned()
        .collect();
    sort_newest_first(&mut history);
    history
}

/// Whether the passive display should be shown
pub fn is_idle(forced: bool, last_call_at: Option<i64>, idle_timeout_ms: i64, now_ms: i64) -> bool {
    if forced {
        return true;
    }
    match last_call_at {
        None => true,
        Some(last) => now_ms - last >= idle_timeout_ms,
    }
}

/// Whether the two newest calls currently form a pair
pub fn pair_active(history: &[CallEvent], now_ms: i64) -> bool {
    match history {
        [newest, older, ..] => {
            newest.created_ms() - older.created_ms() <= GROUP_WINDOW_MS
                && now_ms - older.created_ms() < DUAL_KEEP_MS
        }
        _ => false,
    }
}

/// Cards to show: none when idle, else the newest call or the active pair
pub fn compute_group(history: &[CallEvent], idle: bool, now_ms: i64) -> Vec<CallEvent> {
    if idle || history.is_empty() {
        return Vec::new();
    }
    let take = if pair_active(history, now_ms) { 2 } else { 1 };
    history.iter().take(take).cloned().collect()
}

/// Already-called chips, disjoint from `group`
pub fn recent_items(history: &[CallEvent], group: &[CallEvent]) -> Vec<CallEvent> {
    history
        .iter()
        .filter(|e| !group.iter().any(|g| g.id == e.id))
        .take(RECENT_LIMIT)
        .cloned()
        .collect()
}
