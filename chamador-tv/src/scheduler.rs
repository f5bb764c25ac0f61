//! The single event loop driving the TV
//!
//! One `select!` over:
//! - the four feed subscriptions (calls, trigger, config, slots)
//! - a periodic tick (idle/eviction re-evaluation, volume reconciliation)
//! - the shutdown signal
//!
//! A feed error is logged and the last-known state is kept. A feed that ends
//! is resubscribed after a fixed delay; the replacement stream is the only
//! listener for that feed, so resubscribing never duplicates work.

use crate::announce::{Announce, AnnouncementQueue, AnnouncementRequest, Announcer, SETTLE_DELAY};
use crate::context::TvContext;
use crate::display::DisplayEngine;
use crate::ducking::AudioDucker;
use crate::settings::ConfigResolver;
use chamador_common::events::ChamadorEvent;
use chamador_common::feed::{ConfigSnapshot, EventFeed, FeedError, FeedStream};
use chamador_common::model::{ActiveSlot, AnnounceTrigger, CallEvent};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Timing knobs for the loop
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Idle/eviction re-evaluation period
    pub tick: Duration,
    /// Pause before resubscribing to an ended feed
    pub resubscribe_delay: Duration,
    /// Calls requested from the feed
    pub recent_limit: usize,
    /// Spacing between announcement starts
    pub settle: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            resubscribe_delay: Duration::from_secs(1),
            recent_limit: 50,
            settle: SETTLE_DELAY,
        }
    }
}

/// Owns the engine and reacts to feeds and timers
pub struct Scheduler {
    ctx: Arc<TvContext>,
    feed: Arc<dyn EventFeed>,
    engine: DisplayEngine,
    queue: AnnouncementQueue,
    ducker: AudioDucker,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Scheduler with the standard announcer
    pub fn new(ctx: Arc<TvContext>, feed: Arc<dyn EventFeed>, options: SchedulerOptions) -> Self {
        let ducker = AudioDucker::new(
            Arc::clone(&ctx.player),
            ctx.config.clone(),
            Arc::clone(&ctx.bus),
        );
        let announcer = Arc::new(Announcer::new(Arc::clone(&ctx), ducker.clone()));
        Self::with_announcer(ctx, feed, ducker, announcer, options)
    }

    /// Scheduler with a caller-supplied announcer
    pub fn with_announcer(
        ctx: Arc<TvContext>,
        feed: Arc<dyn EventFeed>,
        ducker: AudioDucker,
        announcer: Arc<dyn Announce>,
        options: SchedulerOptions,
    ) -> Self {
        let queue =
            AnnouncementQueue::with_settle(announcer, Arc::clone(&ctx.bus), options.settle);
        let engine = DisplayEngine::new(ctx.clock.now(), ctx.config.get());
        Self {
            ctx,
            feed,
            engine,
            queue,
            ducker,
            options,
        }
    }

    pub fn queue(&self) -> &AnnouncementQueue {
        &self.queue
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("TV scheduler started");

        let mut calls = self.feed.subscribe_recent_calls(self.options.recent_limit);
        let mut trigger = self.feed.subscribe_announce_trigger();
        let mut config = self.feed.subscribe_config();
        let mut slots = self.feed.subscribe_active_slots();

        let mut tick = tokio::time::interval(self.options.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                item = calls.next() => match item {
                    Some(Ok(events)) => self.on_calls(events),
                    Some(Err(e)) => self.on_feed_error("calls", &e),
                    None => {
                        self.on_feed_ended("calls");
                        let feed = Arc::clone(&self.feed);
                        let limit = self.options.recent_limit;
                        calls = resubscribe(self.options.resubscribe_delay, move || {
                            feed.subscribe_recent_calls(limit)
                        });
                    }
                },

                item = trigger.next() => match item {
                    Some(Ok(record)) => self.on_trigger(record),
                    Some(Err(e)) => self.on_feed_error("trigger", &e),
                    None => {
                        self.on_feed_ended("trigger");
                        let feed = Arc::clone(&self.feed);
                        trigger = resubscribe(self.options.resubscribe_delay, move || {
                            feed.subscribe_announce_trigger()
                        });
                    }
                },

                item = config.next() => match item {
                    Some(Ok(snapshot)) => self.on_config(snapshot),
                    Some(Err(e)) => self.on_feed_error("config", &e),
                    None => {
                        self.on_feed_ended("config");
                        let feed = Arc::clone(&self.feed);
                        config = resubscribe(self.options.resubscribe_delay, move || {
                            feed.subscribe_config()
                        });
                    }
                },

                item = slots.next() => match item {
                    Some(Ok(list)) => self.on_slots(list),
                    Some(Err(e)) => self.on_feed_error("slots", &e),
                    None => {
                        self.on_feed_ended("slots");
                        let feed = Arc::clone(&self.feed);
                        slots = resubscribe(self.options.resubscribe_delay, move || {
                            feed.subscribe_active_slots()
                        });
                    }
                },

                _ = tick.tick() => {
                    self.ducker.reconcile();
                    self.refresh();
                }
            }
        }

        self.queue.shutdown();
        info!("TV scheduler stopped");
    }

    fn on_calls(&mut self, events: Vec<CallEvent>) {
        debug!("Calls snapshot: {} events", events.len());
        let requests = self.engine.apply_calls(events);
        self.enqueue_all(requests);
        self.refresh();
    }

    fn on_trigger(&mut self, record: AnnounceTrigger) {
        debug!("Trigger {} received", record.nonce);
        if let Some(request) = self.engine.apply_trigger(record) {
            self.enqueue_all(vec![request]);
        }
        self.refresh();
    }

    fn on_config(&mut self, snapshot: ConfigSnapshot) {
        let resolved = ConfigResolver::resolve(&snapshot);
        if self.ctx.config.set(resolved.clone()) {
            info!(
                "Operating config updated (mode {}, idle {}s, duck {}/{})",
                resolved.announce_mode,
                resolved.idle_seconds,
                resolved.duck_volume,
                resolved.restore_volume
            );
        }
        self.engine.set_config(resolved);
        self.ducker.reconcile();
        self.refresh();
    }

    fn on_slots(&mut self, slots: Vec<ActiveSlot>) {
        self.engine.apply_slots(slots);
        self.refresh();
    }

    fn enqueue_all(&self, requests: Vec<AnnouncementRequest>) {
        for request in requests {
            self.queue
                .enqueue(&request.name, &request.room, request.source);
        }
    }

    fn on_feed_error(&self, feed: &str, err: &FeedError) {
        warn!("Feed '{}' error, keeping last state: {}", feed, err);
        self.ctx.bus.emit_lossy(ChamadorEvent::FeedInterrupted {
            feed: feed.to_string(),
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn on_feed_ended(&self, feed: &str) {
        error!(
            "Feed '{}' ended; resubscribing in {:?}",
            feed, self.options.resubscribe_delay
        );
        self.ctx.bus.emit_lossy(ChamadorEvent::FeedInterrupted {
            feed: feed.to_string(),
            message: "subscription ended".to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Re-evaluate and publish the display if it changed
    fn refresh(&mut self) {
        let update = self.engine.evaluate(self.ctx.clock.now_ms());

        if update.idle_changed {
            info!(
                "Display {} (forced: {})",
                if update.state.is_idle { "idle" } else { "active" },
                update.state.forced_idle
            );
            self.ctx.bus.emit_lossy(ChamadorEvent::IdleChanged {
                idle: update.state.is_idle,
                forced: update.state.forced_idle,
                timestamp: chrono::Utc::now(),
            });
        }

        if update.changed {
            self.ctx.display.publish(update.state.clone());
            self.ctx.bus.emit_lossy(ChamadorEvent::DisplayChanged {
                state: update.state,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// A stream that waits `delay`, then subscribes again
fn resubscribe<T, F>(delay: Duration, subscribe: F) -> FeedStream<T>
where
    T: Send + 'static,
    F: FnOnce() -> FeedStream<T> + Send + 'static,
{
    stream::once(async move {
        tokio::time::sleep(delay).await;
        subscribe()
    })
    .flatten()
    .boxed()
}
