//! Behaviour every `Store` implementation must share.
//!
//! Each backend's test module calls these against a fresh store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use pancake_ledger_core::{
    Author, EntryDraft, GeoId, Ledger, Location, NewLedger, Packet, PacketBuilder, PacketId,
    PacketQuery,
};

use crate::error::StoreError;
use crate::traits::{InsertResult, Store, StoreExt};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn note(geoid: &str, secs: i64, message: &str) -> Packet {
    PacketBuilder::new(
        "note",
        GeoId::new(geoid),
        json!({"message": message, "attachments": []}),
    )
    .now(at(secs))
    .build()
}

fn chat(geoid: &str, secs: i64, text: &str, thread: &str) -> Packet {
    PacketBuilder::new(
        "chat_message",
        GeoId::new(geoid),
        json!({"text": text, "thread_id": thread, "attachments": []}),
    )
    .now(at(secs))
    .build()
}

fn ids(packets: &[Packet]) -> Vec<PacketId> {
    packets.iter().map(Packet::id).collect()
}

fn new_ledger(participant: &str) -> (Ledger, Option<pancake_ledger_core::LedgerEntry>) {
    Ledger::create(
        NewLedger::new("discussion", Location::new("geo-a"))
            .participant(participant)
            .first_entry(EntryDraft::content(
                Author::inferred(participant),
                json!({"text": "opening"}),
            )),
        at(0),
    )
}

pub async fn packet_roundtrip(store: &impl Store) {
    let packet = PacketBuilder::new(
        "observation",
        GeoId::new("geo-a"),
        json!({"readings": [1, 2.5, -3, true, null], "note": "café ☕"}),
    )
    .tenant(json!({"org": "acme"}))
    .tag("sensor")
    .lang("fr")
    .now(at(0))
    .build();

    assert_eq!(
        store.insert_packet(&packet, &[]).await.unwrap(),
        InsertResult::Inserted
    );
    assert!(store.has_packet(&packet.id()).await.unwrap());

    let stored = store.get_packet(&packet.id()).await.unwrap().unwrap();
    assert_eq!(stored, packet);
    assert_eq!(stored.compute_hash(), stored.footer.hash);

    assert!(store.get_packet(&PacketId::new()).await.unwrap().is_none());
    assert!(!store.has_packet(&PacketId::new()).await.unwrap());
}

pub async fn idempotent_insert(store: &impl Store) {
    let packet = note("geo-a", 0, "hello");
    assert_eq!(
        store.insert_packet(&packet, &[]).await.unwrap(),
        InsertResult::Inserted
    );
    assert_eq!(
        store.insert_packet(&packet, &[]).await.unwrap(),
        InsertResult::AlreadyExists
    );
}

pub async fn conflicting_insert(store: &impl Store) {
    let first = note("geo-a", 0, "original");
    let second = PacketBuilder::new("note", GeoId::new("geo-a"), json!({"message": "imposter"}))
        .id(first.id())
        .now(at(0))
        .build();

    store.insert_packet(&first, &[]).await.unwrap();
    assert_eq!(
        store.insert_packet(&second, &[]).await.unwrap(),
        InsertResult::Conflict {
            existing: first.footer.hash
        }
    );
    assert_eq!(store.get_packet(&first.id()).await.unwrap().unwrap(), first);
}

pub async fn pagination_exhaustion(store: &impl Store) {
    let packets: Vec<Packet> = (1..=5)
        .map(|i| note("geo-a", i, &format!("note {}", i)))
        .collect();
    for packet in &packets {
        store.insert_packet(packet, &[]).await.unwrap();
    }

    let query = PacketQuery::new().limit(2);
    let page1 = store.query_packets(&query).await.unwrap();
    assert_eq!(ids(&page1.items), vec![packets[4].id(), packets[3].id()]);
    assert_eq!(page1.next_cursor, Some(packets[3].id()));

    let page2 = store
        .query_packets(&query.clone().cursor(packets[3].id()))
        .await
        .unwrap();
    assert_eq!(ids(&page2.items), vec![packets[2].id(), packets[1].id()]);
    assert_eq!(page2.next_cursor, Some(packets[1].id()));

    let page3 = store
        .query_packets(&query.clone().cursor(packets[1].id()))
        .await
        .unwrap();
    assert_eq!(ids(&page3.items), vec![packets[0].id()]);
    assert_eq!(page3.next_cursor, None);
}

pub async fn query_filters(store: &impl Store) {
    let n1 = note("geo-a", 1, "Aphids on the north edge");
    let c1 = chat("geo-a", 2, "More APHIDS today", "thread-1");
    let c2 = chat("geo-b", 3, "Irrigation looks fine", "thread-2");
    let c3 = chat("geo-a", 4, "aphid count rising", "thread-3");
    for packet in [&n1, &c1, &c2, &c3] {
        store.insert_packet(packet, &[]).await.unwrap();
    }

    let by_type = store
        .query_packets(&PacketQuery::new().packet_type("chat_message"))
        .await
        .unwrap();
    assert_eq!(ids(&by_type.items), vec![c3.id(), c2.id(), c1.id()]);

    let by_geo_and_type = store
        .query_packets(&PacketQuery::new().geoid("geo-a").packet_type("chat_message"))
        .await
        .unwrap();
    assert_eq!(ids(&by_geo_and_type.items), vec![c3.id(), c1.id()]);

    let window = store
        .query_packets(&PacketQuery::new().time_from(at(2)).time_to(at(3)))
        .await
        .unwrap();
    assert_eq!(ids(&window.items), vec![c2.id(), c1.id()]);

    let keyword = store
        .query_packets(&PacketQuery::new().keyword("APHID"))
        .await
        .unwrap();
    assert_eq!(ids(&keyword.items), vec![c3.id(), c1.id(), n1.id()]);

    let threads = store
        .query_packets(
            &PacketQuery::new()
                .packet_type("chat_message")
                .thread_ids(["thread-1", "thread-2"])
                .keyword("aphid"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&threads.items), vec![c1.id()]);

    let no_threads = store
        .query_packets(&PacketQuery::new().thread_ids(Vec::<String>::new()))
        .await
        .unwrap();
    assert!(no_threads.is_empty());
    assert_eq!(no_threads.next_cursor, None);
}

pub async fn secondary_geoids(store: &impl Store) {
    let packet = chat("geo-a", 0, "hello", "thread-1");
    let extra = [
        GeoId::new("geo-c"),
        GeoId::new("geo-b"),
        GeoId::new("geo-a"),
        GeoId::new("geo-b"),
    ];
    store.insert_packet(&packet, &extra).await.unwrap();

    assert_eq!(
        store.packet_geoids(&packet.id()).await.unwrap(),
        vec![GeoId::new("geo-b"), GeoId::new("geo-c")]
    );

    for geoid in ["geo-a", "geo-b", "geo-c"] {
        let page = store
            .query_packets(&PacketQuery::new().geoid(geoid))
            .await
            .unwrap();
        assert_eq!(ids(&page.items), vec![packet.id()], "geoid {}", geoid);
    }
    let none = store
        .query_packets(&PacketQuery::new().geoid("geo-z"))
        .await
        .unwrap();
    assert!(none.is_empty());

    assert!(store.packet_geoids(&PacketId::new()).await.unwrap().is_empty());
}

pub async fn bad_requests(store: &impl Store) {
    store.insert_packet(&note("geo-a", 0, "x"), &[]).await.unwrap();

    for limit in [0, -1] {
        assert!(matches!(
            store.query_packets(&PacketQuery::new().limit(limit)).await,
            Err(StoreError::BadRequest(_))
        ));
    }
    assert!(matches!(
        store
            .query_packets(&PacketQuery::new().cursor(PacketId::new()))
            .await,
        Err(StoreError::BadRequest(_))
    ));
}

pub async fn ledger_roundtrip(store: &impl Store) {
    let (mut ledger, first) = new_ledger("user-ana");
    store.insert_ledger(&ledger, first.as_ref()).await.unwrap();

    for i in 1..=2 {
        let revision = ledger.revision;
        let entry = ledger
            .append(
                EntryDraft::content(Author::inferred("user-ana"), json!({ "n": i })),
                at(i),
            )
            .unwrap();
        store
            .update_ledger(&ledger, Some(&entry), revision)
            .await
            .unwrap();
    }

    let stored = store.get_ledger(&ledger.ledger_id).await.unwrap().unwrap();
    assert_eq!(stored, ledger);

    let entries = store.get_entries(&ledger.ledger_id).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(stored.verify_entries(&entries).is_ok());

    assert!(matches!(
        store.insert_ledger(&ledger, None).await,
        Err(StoreError::Conflict(_))
    ));
}

pub async fn stale_revision(store: &impl Store) {
    let (ledger, first) = new_ledger("user-ana");
    store.insert_ledger(&ledger, first.as_ref()).await.unwrap();

    let mut a = ledger.clone();
    let mut b = ledger.clone();
    let draft = |text: &str| EntryDraft::content(Author::inferred("user-ana"), json!({ "text": text }));

    let entry_a = a.append(draft("from a"), at(1)).unwrap();
    store
        .update_ledger(&a, Some(&entry_a), ledger.revision)
        .await
        .unwrap();

    let entry_b = b.append(draft("from b"), at(1)).unwrap();
    let err = store
        .update_ledger(&b, Some(&entry_b), ledger.revision)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::StaleRevision { expected, actual, .. } if expected == 0 && actual == 1
    ));

    let entries = store.get_entries(&ledger.ledger_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].payload, json!({"text": "from a"}));

    let (orphan, _) = new_ledger("user-ben");
    assert!(matches!(
        store.update_ledger(&orphan, None, 0).await,
        Err(StoreError::NotFound(_))
    ));
}

pub async fn list_ledgers(store: &impl Store) {
    let (ana, _) = new_ledger("user-ana");
    let (ben, _) = new_ledger("user-ben");
    store.insert_ledger(&ana, None).await.unwrap();
    store.insert_ledger(&ben, None).await.unwrap();

    let all = store.list_ledgers(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let mine = store.list_ledgers(Some("user-ben")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].ledger_id, ben.ledger_id);

    assert!(store.list_ledgers(Some("user-zed")).await.unwrap().is_empty());
}

pub async fn scan_packets(store: &impl Store) {
    let packets: Vec<Packet> = (0..7).map(|i| note("geo-a", i, "n")).collect();
    for packet in &packets {
        store.insert_packet(packet, &[]).await.unwrap();
    }
    let all = store
        .scan_packets(&PacketQuery::new().limit(3))
        .await
        .unwrap();
    let expected: Vec<PacketId> = packets.iter().rev().map(Packet::id).collect();
    assert_eq!(ids(&all), expected);
}
