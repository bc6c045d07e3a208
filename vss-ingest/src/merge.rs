//! Merge and transition detection
//!
//! Pure functions over documents; nothing here touches the store.

use vss_common::models::{category_of, VariantDocument};

/// Combine the stored document (if any) with a freshly built one.
///
/// Subscription state always comes from the stored document. When both
/// carry a current classification and they differ, the stored one moves to
/// the end of history. An incoming document without classification, or with
/// the same one, leaves the stored classification alone.
pub fn merge(existing: Option<&VariantDocument>, incoming: VariantDocument) -> VariantDocument {
    let Some(existing) = existing else {
        return incoming;
    };

    let mut classification = existing.classification.clone();

    if let Some(current) = incoming
        .classification
        .current
        .filter(|current| classification.current.as_ref() != Some(current))
    {
        if let Some(previous) = classification.current.replace(current) {
            classification.history.push(previous);
        }
    }

    if let Some(id) = incoming
        .classification
        .variation_id
        .filter(|id| !id.is_empty())
    {
        classification.variation_id = Some(id);
    }

    VariantDocument {
        key: existing.key.clone(),
        coordinates: incoming.coordinates,
        classification,
        subscribers: existing.subscribers.clone(),
        tags: existing.tags.clone(),
    }
}

/// True when the category moved between `old` (absent -> unknown) and `new`
pub fn changed(old: Option<&VariantDocument>, new: &VariantDocument) -> bool {
    category_of(old) != new.category()
}

/// Whether an incoming document carries anything the store lacks.
///
/// Identical re-deliveries are skipped so that replaying a feed does not
/// grow history.
pub fn needs_write(existing: Option<&VariantDocument>, incoming: &VariantDocument) -> bool {
    let Some(existing) = existing else {
        return true;
    };

    let incoming_current = incoming.classification.current.as_ref();
    let new_current =
        incoming_current.is_some() && incoming_current != existing.classification.current.as_ref();

    let new_variation_id = incoming
        .classification
        .variation_id
        .as_deref()
        .is_some_and(|id| !id.is_empty())
        && incoming.classification.variation_id != existing.classification.variation_id;

    new_current || new_variation_id || incoming.coordinates != existing.coordinates
}
