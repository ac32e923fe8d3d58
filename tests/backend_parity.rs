use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use raidguard::activity::{
    Activity, ActivityKind, ActivityLimit, ActivityStore, ActivityStores, Filter, ManualClock,
    MemoryActivityStore, SqliteActivityStore,
};
use raidguard::dispatch::RecordingDispatcher;
use raidguard::{Action, AntiSpamEngine, ChannelKind, GuardEvent};
use tempfile::TempDir;

const START: i64 = 1_700_000_000;

type StoreFactory = fn(ActivityKind, Arc<ManualClock>, &TempDir) -> Arc<dyn ActivityStore>;

fn memory(kind: ActivityKind, clock: Arc<ManualClock>, _tmp: &TempDir) -> Arc<dyn ActivityStore> {
    Arc::new(MemoryActivityStore::new(kind, clock))
}

fn sqlite(kind: ActivityKind, clock: Arc<ManualClock>, tmp: &TempDir) -> Arc<dyn ActivityStore> {
    Arc::new(SqliteActivityStore::open(&tmp.path().join("activity.db"), kind, clock).unwrap())
}

const BACKENDS: [(&str, StoreFactory); 2] = [("memory", memory), ("sqlite", sqlite)];

fn message(channel_id: u64, message_id: u64) -> Activity {
    Activity::MessagePosted {
        channel_id,
        message_id,
    }
}

#[test]
fn count_matches_records_inside_window_regardless_of_insert_order() {
    // Offsets in seconds from START; inserted out of time order.
    let offsets = [9, 2, 7, 0, 5, 10, 3];
    let window = Duration::from_secs(5);

    for (name, open) in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_secs(START));
        let store = open(ActivityKind::Message, clock.clone(), &tmp);
        for (i, offset) in offsets.iter().enumerate() {
            clock.set(DateTime::from_timestamp(START + offset, 0).unwrap());
            store.insert(1, 7, message(100, i as u64)).unwrap();
        }
        clock.set(DateTime::from_timestamp(START + 10, 0).unwrap());

        let expected = offsets.iter().filter(|o| **o >= 5).count();
        assert_eq!(
            store.count_matching(1, &Filter::subject(7), window).unwrap(),
            expected,
            "{name}"
        );
        store.purge_older_than(window).unwrap();
        store.purge_older_than(window).unwrap();
        assert_eq!(
            store.count_matching(1, &Filter::subject(7), window).unwrap(),
            expected,
            "{name}"
        );
    }
}

#[test]
fn cursors_never_return_a_record_twice() {
    for (name, open) in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_secs(START));
        let store = open(ActivityKind::Join, clock.clone(), &tmp);

        let mut seen = Vec::new();
        for round in 0..4u64 {
            for subject in 0..3 {
                store.insert(1, round * 10 + subject, Activity::MemberJoined).unwrap();
            }
            clock.advance(Duration::from_millis(50));
            let fetched = store.fetch_unconsumed(1, &Filter::any()).unwrap();
            assert_eq!(fetched.len(), 3, "{name} round {round}");
            assert!(store.fetch_unconsumed(1, &Filter::any()).unwrap().is_empty());
            seen.extend(fetched.into_iter().map(|r| r.subject_id));
            clock.advance(Duration::from_millis(50));
        }
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(seen.len(), 12, "{name}");
        assert_eq!(deduped, seen, "{name}");
    }
}

#[tokio::test]
async fn flood_and_raid_play_out_identically() {
    let mut transcripts = Vec::new();

    for (_name, open) in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_secs(START));
        let stores = ActivityStores {
            messages: open(ActivityKind::Message, clock.clone(), &tmp),
            joins: open(ActivityKind::Join, clock.clone(), &tmp),
        };
        let engine = AntiSpamEngine::new(
            stores,
            ActivityLimit::new(Duration::from_secs(5), 1).unwrap(),
            ActivityLimit::new(Duration::from_secs(3), 3).unwrap(),
            true,
        );
        let dispatcher = RecordingDispatcher::new();

        let mut events = Vec::new();
        for message_id in 1..=3 {
            events.push((
                300,
                GuardEvent::MessagePosted {
                    tenant_id: 1,
                    subject_id: 7,
                    channel_id: 100 + message_id % 2,
                    message_id,
                    channel_kind: ChannelKind::Text,
                    content: String::new(),
                },
            ));
        }
        for subject_id in 20..=24 {
            events.push((
                200,
                GuardEvent::MemberJoined {
                    tenant_id: 1,
                    subject_id,
                },
            ));
        }
        events.push((
            6_000,
            GuardEvent::MemberLeft {
                tenant_id: 1,
                subject_id: 20,
            },
        ));
        events.push((
            0,
            GuardEvent::MessagePosted {
                tenant_id: 1,
                subject_id: 7,
                channel_id: 100,
                message_id: 4,
                channel_kind: ChannelKind::Text,
                content: String::new(),
            },
        ));

        for (gap_ms, event) in &events {
            engine.handle(event, &dispatcher).await.unwrap();
            clock.advance(Duration::from_millis(*gap_ms));
        }
        transcripts.push(dispatcher.calls());
    }

    let memory = &transcripts[0];
    assert_eq!(memory, &transcripts[1]);

    let kicks: Vec<_> = memory
        .iter()
        .filter_map(|a| match a {
            Action::KickMember { subject_id, .. } => Some(*subject_id),
            _ => None,
        })
        .collect();
    assert_eq!(kicks, vec![20, 21, 22, 23, 24]);

    let notices = memory
        .iter()
        .filter(|a| matches!(a, Action::Notify { .. }))
        .count();
    assert_eq!(notices, 1);
}
