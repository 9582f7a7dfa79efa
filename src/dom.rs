//! Document-node identity
//!
//! This subsystem never owns document nodes. The embedder's render tree
//! assigns each node a stable integer id and notifies teardown explicitly;
//! everything here keys off [`DomNodeId`] and treats an id whose entries have
//! been purged as absent. Holding an id can therefore never dangle — the
//! worst case is a lookup miss, which every caller already handles.

use rustc_hash::FxHasher;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

/// Stable identifier of a render-tree node, assigned by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DomNodeId(pub u64);

impl fmt::Display for DomNodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "node#{}", self.0)
  }
}

/// Stable key of one tracked candidate: the owning node plus the content
/// source painted into it.
///
/// The same node repainting the same content maps to the same id, so repaints
/// update records in place instead of duplicating them. A node swapping its
/// image source produces a distinct id and therefore a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CandidateId(u64);

impl CandidateId {
  /// Key for a text block aggregated under `block_root`.
  pub fn for_text(block_root: DomNodeId) -> Self {
    let mut hasher = FxHasher::default();
    0u8.hash(&mut hasher);
    block_root.hash(&mut hasher);
    Self(hasher.finish())
  }

  /// Key for an image painted into `node` from `media_source`.
  pub fn for_image(node: DomNodeId, media_source: &str) -> Self {
    let mut hasher = FxHasher::default();
    1u8.hash(&mut hasher);
    node.hash(&mut hasher);
    media_source.hash(&mut hasher);
    Self(hasher.finish())
  }
}

impl fmt::Display for CandidateId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "candidate#{:016x}", self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_node_same_source_is_stable() {
    let node = DomNodeId(7);
    assert_eq!(
      CandidateId::for_image(node, "https://example.test/hero.jpg"),
      CandidateId::for_image(node, "https://example.test/hero.jpg"),
    );
    assert_eq!(CandidateId::for_text(node), CandidateId::for_text(node));
  }

  #[test]
  fn source_swap_changes_identity() {
    let node = DomNodeId(7);
    assert_ne!(
      CandidateId::for_image(node, "a.png"),
      CandidateId::for_image(node, "b.png"),
    );
  }

  #[test]
  fn text_and_image_keys_never_collide_for_one_node() {
    let node = DomNodeId(9);
    assert_ne!(CandidateId::for_text(node), CandidateId::for_image(node, ""));
  }
}
