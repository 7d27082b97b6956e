//! Maps vector-search hits back to the documents they came from.

use crate::vector::chunker::ChunkId;
use crate::vector::index::Neighbor;
use std::collections::{BTreeSet, HashSet};

/// The document a hit id belongs to: the part before `_chunk_{i}`, or the id itself.
pub fn document_id_of(hit_id: &str) -> String {
    hit_id
        .parse::<ChunkId>()
        .map(|chunk| chunk.document_id)
        .unwrap_or_else(|_| hit_id.to_string())
}

/// The unique documents behind a list of hit ids.
pub fn resolve<'a, I>(hit_ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    hit_ids.into_iter().map(document_id_of).collect()
}

/// Unique document ids in order of first appearance, preferring the structured
/// `document_id` a neighbor carries over parsing its id.
pub fn resolve_neighbors(neighbors: &[Neighbor]) -> Vec<String> {
    let mut seen = HashSet::new();
    neighbors
        .iter()
        .map(|n| {
            n.document_id
                .clone()
                .unwrap_or_else(|| document_id_of(&n.id))
        })
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hits_collapse_to_documents() {
        let resolved = resolve(["7_chunk_0", "7_chunk_1", "9_chunk_0"]);
        assert_eq!(resolved, BTreeSet::from(["7".to_string(), "9".to_string()]));
    }

    #[test]
    fn summary_hits_resolve_to_themselves() {
        assert_eq!(document_id_of("31337"), "31337");
    }

    #[test]
    fn structured_ids_win_and_order_is_kept() {
        let neighbors = vec![
            Neighbor {
                id: "9_chunk_3".into(),
                document_id: None,
                chunk_index: None,
                distance: 0.1,
            },
            Neighbor {
                id: "opaque".into(),
                document_id: Some("7".into()),
                chunk_index: Some(0),
                distance: 0.2,
            },
            Neighbor {
                id: "9_chunk_0".into(),
                document_id: Some("9".into()),
                chunk_index: Some(0),
                distance: 0.3,
            },
        ];
        assert_eq!(resolve_neighbors(&neighbors), vec!["9", "7"]);
    }
}
