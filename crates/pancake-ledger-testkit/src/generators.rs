//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};

use pancake_ledger_core::{
    Author, EntryDraft, GeoId, Ledger, LedgerEntry, Location, NewLedger, Packet, PacketBuilder,
    PacketId,
};

/// Generate an arbitrary JSON value: scalars, strings with non-ASCII and
/// control characters, and nested arrays and objects.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "[a-zA-Z0-9 éß☕\n\t\"\\\\\u{1}]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a JSON object body.
pub fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,8}", json_value(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Generate a geoid.
pub fn geoid() -> impl Strategy<Value = GeoId> {
    "geo-[a-z0-9]{1,12}".prop_map(GeoId::new)
}

/// Generate a timestamp between 2000 and 2100.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800_000i64..4_102_444_800_000i64)
        .prop_map(|ms| Utc.timestamp_millis_opt(ms).single().unwrap_or_default())
}

/// Generate a packet type.
pub fn packet_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("note".to_string()),
        Just("chat_message".to_string()),
        "[a-z][a-z_]{0,15}",
    ]
}

/// Parameters for generating a packet.
#[derive(Debug, Clone)]
pub struct PacketParams {
    pub packet_type: String,
    pub geoid: GeoId,
    pub observed_at: DateTime<Utc>,
    pub body: Value,
    pub prev: Option<PacketId>,
    pub tags: Vec<String>,
}

impl Arbitrary for PacketParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            packet_type(),
            geoid(),
            timestamp(),
            json_object(),
            any::<Option<u128>>(),
            prop::collection::vec("[a-z]{1,8}", 0..3),
        )
            .prop_map(|(packet_type, geoid, observed_at, body, prev, tags)| PacketParams {
                packet_type,
                geoid,
                observed_at,
                body,
                prev: prev.map(|n| PacketId::from(ulid::Ulid(n))),
                tags,
            })
            .boxed()
    }
}

/// Generate a packet from parameters. The id is derived from the
/// observation time.
pub fn packet_from_params(params: &PacketParams) -> Packet {
    let mut builder = PacketBuilder::new(
        params.packet_type.clone(),
        params.geoid.clone(),
        params.body.clone(),
    )
    .now(params.observed_at)
    .tags(params.tags.clone());

    if let Some(prev) = params.prev {
        builder = builder.prev(prev);
    }

    builder.build()
}

/// Generate an entry draft from one of a few authors.
pub fn entry_draft() -> impl Strategy<Value = EntryDraft> {
    (
        prop_oneof![Just("user-ana"), Just("user-ben"), Just("ai-agronomist")],
        json_object(),
        any::<bool>(),
    )
        .prop_map(|(agent, payload, reference)| {
            let author = Author::inferred(agent);
            if reference {
                EntryDraft::reference(author, payload)
            } else {
                EntryDraft::content(author, payload)
            }
        })
}

/// Build a ledger and append `drafts` one second apart.
pub fn ledger_with_entries(drafts: Vec<EntryDraft>) -> (Ledger, Vec<LedgerEntry>) {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default();
    let (mut ledger, _) = Ledger::create(
        NewLedger::new("discussion", Location::new("geo-field-a")).participant("user-ana"),
        start,
    );
    let mut entries = Vec::with_capacity(drafts.len());
    for (i, draft) in drafts.into_iter().enumerate() {
        let now = start + chrono::Duration::seconds(i as i64 + 1);
        if let Ok(entry) = ledger.append(draft, now) {
            entries.push(entry);
        }
    }
    (ledger, entries)
}
