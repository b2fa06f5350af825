//! Homeowner and guest allow-lists.
//!
//! Readers always see one complete snapshot. A reload builds the new lists
//! off to the side and swaps a single `Arc`, so a lookup running
//! concurrently with a reload answers from either the old lists or the new
//! ones, never a mix.

use gatewarden_core::{Category, GateConfig, Plate, PlateNormalizer};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// One immutable generation of the allow-lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessLists {
    homeowner: HashSet<Plate>,
    guest: HashSet<Plate>,
}

impl AccessLists {
    /// Normalizes raw entries. Entries that normalize to nothing are dropped.
    pub fn from_raw<S: AsRef<str>>(
        normalizer: &PlateNormalizer,
        homeowner: &[S],
        guest: &[S],
    ) -> Self {
        Self {
            homeowner: normalize_all(normalizer, homeowner, Category::Homeowner),
            guest: normalize_all(normalizer, guest, Category::Guest),
        }
    }

    pub fn from_config(config: &GateConfig, normalizer: &PlateNormalizer) -> Self {
        Self::from_raw(
            normalizer,
            config.homeowner_plates.as_slice(),
            config.guest_plates.as_slice(),
        )
    }

    /// Homeowner is checked first, so a plate on both lists is a homeowner.
    pub fn lookup(&self, plate: &Plate) -> Option<Category> {
        if plate.is_empty() {
            None
        } else if self.homeowner.contains(plate) {
            Some(Category::Homeowner)
        } else if self.guest.contains(plate) {
            Some(Category::Guest)
        } else {
            None
        }
    }

    /// Number of distinct homeowner plates.
    pub fn homeowner_count(&self) -> usize {
        self.homeowner.len()
    }

    /// Number of distinct guest plates.
    pub fn guest_count(&self) -> usize {
        self.guest.len()
    }
}

fn normalize_all<S: AsRef<str>>(
    normalizer: &PlateNormalizer,
    raw: &[S],
    category: Category,
) -> HashSet<Plate> {
    let mut out = HashSet::with_capacity(raw.len());
    for entry in raw {
        let entry = entry.as_ref();
        let plate = normalizer.normalize(entry);
        if plate.is_empty() {
            tracing::warn!(entry, %category, "allow-list entry does not normalize, skipped");
            continue;
        }
        if !plate.is_well_formed() {
            tracing::warn!(%plate, %category, "allow-list entry has an unusual format");
        }
        out.insert(plate);
    }
    out
}

/// Shared, atomically reloadable allow-list registry.
#[derive(Debug, Default)]
pub struct AccessRegistry {
    current: RwLock<Arc<AccessLists>>,
}

impl AccessRegistry {
    /// Registry serving `lists` until the first reload.
    pub fn new(lists: AccessLists) -> Self {
        Self {
            current: RwLock::new(Arc::new(lists)),
        }
    }

    /// `(granted, category)` for a plate against the current snapshot.
    pub fn is_authorized(&self, plate: &Plate) -> (bool, Option<Category>) {
        let category = self.snapshot().lookup(plate);
        (category.is_some(), category)
    }

    /// The current generation. Holding it pins that generation.
    pub fn snapshot(&self) -> Arc<AccessLists> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A writer only ever stores a fully built Arc, so the value is
            // intact even if that writer panicked.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the whole snapshot.
    pub fn reload(&self, lists: AccessLists) {
        let homeowners = lists.homeowner_count();
        let guests = lists.guest_count();
        let next = Arc::new(lists);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        tracing::info!(homeowners, guests, "access lists reloaded");
    }
}
