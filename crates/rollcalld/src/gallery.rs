//! The gallery cache: the one piece of shared mutable state.
//!
//! Recognition requests take an `Arc` snapshot at the start of the
//! request and keep it for the request's lifetime. A rebuild constructs
//! a complete new [`Gallery`] off to the side and publishes it with a
//! single pointer swap — readers always see fully-old or fully-new,
//! never a partially populated cache.

use rollcall_core::GalleryEntry;
use std::sync::{Arc, RwLock};

/// An immutable snapshot of the enrolled-face gallery.
#[derive(Debug, Default)]
pub struct Gallery {
    pub entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Swappable holder for the current gallery snapshot.
pub struct GalleryCache {
    current: RwLock<Arc<Gallery>>,
}

impl GalleryCache {
    /// Empty at process start; populated by the first rebuild.
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(Arc::new(Gallery::default())),
        }
    }

    /// The current snapshot. Cheap; callers hold the Arc for as long as
    /// they need a consistent view.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Atomically publish a freshly built gallery, replacing the previous
    /// snapshot in full. Outstanding readers keep their old Arc.
    pub fn replace(&self, gallery: Gallery) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(gallery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Embedding, StudentSummary};

    fn entry(id: i64) -> GalleryEntry {
        GalleryEntry {
            student: StudentSummary {
                id,
                student_id: format!("S{id:03}"),
                name: "x".into(),
                roll: "1".into(),
                department: "CS".into(),
            },
            embedding: Embedding {
                values: vec![id as f32],
                model_version: None,
            },
        }
    }

    #[test]
    fn starts_empty() {
        let cache = GalleryCache::empty();
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn replace_swaps_the_whole_snapshot() {
        let cache = GalleryCache::empty();
        cache.replace(Gallery::new(vec![entry(1), entry(2)]));
        assert_eq!(cache.snapshot().len(), 2);

        cache.replace(Gallery::new(vec![entry(3)]));
        assert_eq!(cache.snapshot().len(), 1);
        assert_eq!(cache.snapshot().entries[0].student.id, 3);
    }

    #[test]
    fn outstanding_readers_keep_the_old_snapshot() {
        let cache = GalleryCache::empty();
        cache.replace(Gallery::new(vec![entry(1)]));

        let held = cache.snapshot();
        cache.replace(Gallery::new(vec![entry(2), entry(3)]));

        // The reader that took a snapshot before the swap still sees the
        // old, fully consistent gallery.
        assert_eq!(held.len(), 1);
        assert_eq!(held.entries[0].student.id, 1);
        assert_eq!(cache.snapshot().len(), 2);
    }
}
