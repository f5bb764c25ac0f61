//! Scheduler integration tests
//!
//! Run the real scheduler loop against in-memory and scripted feeds with a
//! recording announcer. Tokio time is paused; the wall clock is a
//! ManualClock the tests advance by hand.

mod helpers;

use chamador_common::events::ChamadorEvent;
use chamador_common::feed::{ConfigSnapshot, EventFeed, FeedError, MemoryFeed};
use chamador_common::model::AnnounceTrigger;
use chamador_tv::scheduler::{Scheduler, SchedulerOptions};
use chamador_tv::settings::{AnnounceMode, OperatingConfig};
use helpers::{
    call, drain, trigger, Backends, Outcome, RecordingAnnouncer, ScriptedFeed, TestTv, START_MS,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const OFF: (bool, Outcome) = (false, Outcome::Refuse);

struct Running {
    tv: TestTv,
    announcer: Arc<RecordingAnnouncer>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Running {
    fn start(feed: Arc<dyn EventFeed>, config: OperatingConfig) -> Self {
        let backends = Backends::new(OFF, OFF);
        let tv = TestTv::new(backends.speech(), config);
        let announcer = RecordingAnnouncer::new(Duration::from_secs(3));
        let scheduler = Scheduler::with_announcer(
            tv.ctx.clone(),
            feed,
            tv.ducker.clone(),
            announcer.clone(),
            SchedulerOptions::default(),
        );
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.run(rx));
        Self {
            tv,
            announcer,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap();
    }
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn idle_trigger(nonce: &str, idle: bool, ms: i64) -> AnnounceTrigger {
    AnnounceTrigger {
        idle: Some(idle),
        ..trigger(nonce, "", "", ms)
    }
}

#[tokio::test(start_paused = true)]
async fn test_identical_triggers_both_announced_in_order() {
    let feed = Arc::new(MemoryFeed::new());
    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;

    feed.write_trigger(trigger("n1", "João", "3", START_MS + 100));
    settle(200).await;
    feed.write_trigger(trigger("n2", "João", "3", START_MS + 300));

    settle(15_000).await;
    let spoken = run.announcer.spoken();
    assert_eq!(spoken.len(), 2, "each nonce is its own announcement");
    assert!(spoken.iter().all(|s| s.name == "João" && s.room == "3"));

    // Never overlapping, and spaced by the settle delay
    assert!(spoken[1].started >= spoken[0].ended);
    assert!(spoken[1].started - spoken[0].started >= Duration::from_millis(4_500));

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_nonce_is_ignored() {
    let feed = Arc::new(MemoryFeed::new());
    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;

    let t = trigger("same", "Ana", "1", START_MS + 100);
    feed.write_trigger(t.clone());
    settle(100).await;
    feed.write_trigger(t);

    settle(10_000).await;
    assert_eq!(run.announcer.names(), vec!["Ana"]);
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_trigger_from_before_startup_only_applies_idle() {
    let feed = Arc::new(MemoryFeed::new());
    feed.write_trigger(AnnounceTrigger {
        idle: Some(true),
        ..trigger("old", "Carlos", "2", START_MS - 60_000)
    });
    feed.publish_calls(vec![call("a", "Ana", "1", START_MS)]);

    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(6_000).await;

    assert!(run.announcer.spoken().is_empty());
    let display = run.tv.ctx.display.current();
    assert!(display.is_idle);
    assert!(display.forced_idle);

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_flag_forces_and_releases() {
    let feed = Arc::new(MemoryFeed::new());
    feed.publish_calls(vec![call("a", "Ana", "1", START_MS)]);
    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;
    assert!(!run.tv.ctx.display.current().is_idle);

    feed.write_trigger(idle_trigger("i1", true, START_MS + 100));
    settle(10).await;
    let display = run.tv.ctx.display.current();
    assert!(display.is_idle && display.forced_idle);
    assert!(display.current_group.is_empty());

    feed.write_trigger(idle_trigger("i2", false, START_MS + 200));
    settle(10).await;
    let display = run.tv.ctx.display.current();
    assert!(!display.is_idle);
    assert_eq!(display.current_group[0].name, "Ana");

    // Idle-only writes carry no name and speak nothing
    settle(10_000).await;
    assert!(run.announcer.spoken().is_empty());
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_tick_moves_to_idle_after_inactivity() {
    let feed = Arc::new(MemoryFeed::new());
    feed.publish_calls(vec![call("a", "Ana", "1", START_MS)]);
    let run = Running::start(
        feed.clone(),
        OperatingConfig {
            idle_seconds: 60,
            ..OperatingConfig::default()
        },
    );
    let mut events = run.tv.events();
    settle(10).await;
    assert!(!run.tv.ctx.display.current().is_idle);

    run.tv.clock.advance(Duration::from_secs(61));
    settle(6_000).await;

    assert!(run.tv.ctx.display.current().is_idle);
    let went_idle = drain(&mut events).into_iter().any(|e| {
        matches!(
            e,
            ChamadorEvent::IdleChanged {
                idle: true,
                forced: false,
                ..
            }
        )
    });
    assert!(went_idle);
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_seeded_calls_are_not_announced_but_new_recalls_are() {
    let feed = Arc::new(MemoryFeed::new());
    let mut old_recall = call("r0", "Bia", "2", START_MS - 5_000);
    old_recall.is_recall = true;
    feed.publish_calls(vec![call("a", "Ana", "1", START_MS - 10_000), old_recall]);

    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;

    let mut recall = call("r1", "Ana", "1", START_MS + 1_000);
    recall.is_recall = true;
    feed.append_call(recall);

    settle(10_000).await;
    assert_eq!(run.announcer.names(), vec!["Ana"]);

    // Recalls never take a history slot
    let display = run.tv.ctx.display.current();
    assert_eq!(display.current_group.len(), 1);
    assert_eq!(display.current_group[0].id, "a");
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_feed_error_keeps_state_and_resubscribes() {
    let mut recall = call("r1", "Maria", "4", START_MS + 500);
    recall.is_recall = true;
    let feed = ScriptedFeed::new(vec![
        vec![
            Ok(vec![call("a", "Ana", "1", START_MS)]),
            Err(FeedError::Disconnected("socket closed".to_string())),
        ],
        vec![Ok(vec![recall, call("a", "Ana", "1", START_MS)])],
    ]);

    let run = Running::start(feed.clone(), OperatingConfig::default());
    let mut events = run.tv.events();
    settle(500).await;

    // The error and the end of the stream are both reported
    let interruptions: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ChamadorEvent::FeedInterrupted { feed, message, .. } => {
                assert_eq!(feed, "calls");
                Some(message)
            }
            _ => None,
        })
        .collect();
    assert_eq!(interruptions.len(), 2);
    assert!(interruptions[0].contains("socket closed"));

    // Fail-static: last good snapshot still on screen
    let display = run.tv.ctx.display.current();
    assert!(!display.is_idle);
    assert_eq!(display.current_group[0].name, "Ana");
    assert_eq!(feed.call_subscriptions(), 1);

    settle(1_000).await;
    assert!(feed.call_subscriptions() >= 2);

    settle(5_000).await;
    assert_eq!(run.announcer.names(), vec!["Maria"]);
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_config_applied_when_it_arrives() {
    let feed = Arc::new(MemoryFeed::new());
    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;
    assert_eq!(run.tv.ctx.config.get(), OperatingConfig::default());

    feed.publish_config(ConfigSnapshot::main(json!({
        "announceMode": "beep",
        "idleSeconds": 999,
        "highlightColor": "#ff0000",
        "duckVolume": "loud"
    })));
    settle(10).await;

    let config = run.tv.ctx.config.get();
    assert_eq!(config.announce_mode, AnnounceMode::Beep);
    assert_eq!(config.idle_seconds, 300);
    assert_eq!(config.duck_volume, 20);

    let display = run.tv.ctx.display.current();
    assert_eq!(display.highlight_color, "#ff0000");
    assert_eq!(display.idle_seconds, 300);
    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_loop() {
    let feed = Arc::new(MemoryFeed::new());
    let run = Running::start(feed.clone(), OperatingConfig::default());
    settle(10).await;

    feed.write_trigger(trigger("n1", "Ana", "1", START_MS + 100));
    settle(10).await;
    let announcer = run.announcer.clone();
    run.stop().await;

    // The in-flight announcement was aborted with the queue
    settle(10_000).await;
    assert!(announcer.spoken().is_empty());
}
