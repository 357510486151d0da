//! Triple export: a read-only graph projection of stored packets.
//!
//! Each packet becomes a handful of `(subject, predicate, object)` facts,
//! written one JSON object per line.

use std::io::Write;

use pancake_ledger_core::{Packet, PacketQuery};
use pancake_ledger_store::Store;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::geo::GeoResolver;
use crate::kernel::Kernel;

pub const RDF_TYPE: &str = "rdf:type";
pub const PACKET_CLASS: &str = "pancake:Packet";
pub const PRED_TYPE: &str = "pancake:type";
pub const PRED_GEOID: &str = "pancake:geoid";
pub const PRED_TIMESTAMP: &str = "pancake:timestamp";
pub const PRED_PREV: &str = "pancake:prev";

/// One fact about a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    fn new(subject: &str, predicate: &str, object: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.into(),
        }
    }
}

fn packet_node(id: impl std::fmt::Display) -> String {
    format!("packet:{}", id)
}

/// The facts for one packet. The `prev` link is only present when the
/// packet continues another.
pub fn packet_triples(packet: &Packet) -> Vec<Triple> {
    let subject = packet_node(packet.id());
    let mut triples = vec![
        Triple::new(&subject, RDF_TYPE, PACKET_CLASS),
        Triple::new(&subject, PRED_TYPE, packet.packet_type()),
        Triple::new(&subject, PRED_GEOID, packet.geoid().as_str()),
        Triple::new(&subject, PRED_TIMESTAMP, packet.header.timestamp.as_str()),
    ];
    if let Some(prev) = packet.prev() {
        triples.push(Triple::new(&subject, PRED_PREV, packet_node(prev)));
    }
    triples
}

impl<S: Store, R: GeoResolver> Kernel<S, R> {
    /// Write the triples of every packet matching `filter` as NDJSON.
    ///
    /// Pages through the query from the filter's cursor onwards. Returns
    /// the number of triples written.
    pub async fn export_triples<W: Write>(&self, filter: &PacketQuery, mut writer: W) -> Result<usize> {
        let mut query = filter.clone();
        let mut written = 0;

        loop {
            let page = self.query_packets(&query).await?;
            for packet in &page.items {
                for triple in packet_triples(packet) {
                    serde_json::to_writer(&mut writer, &triple)
                        .map_err(std::io::Error::from)?;
                    writer.write_all(b"\n")?;
                    written += 1;
                }
            }
            match page.next_cursor {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }

        writer.flush()?;
        debug!(triples = written, "triples exported");
        Ok(written)
    }
}
