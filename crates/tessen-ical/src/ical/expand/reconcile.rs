//! Timezone reconciliation.
//!
//! Rewrites a calendar document so that every VTIMEZONE block either matches
//! a system zone (the block is replaced by the builtin definition) or keeps
//! a custom identifier that provably does not collide with a previously
//! stored, different definition. All TZID references in the document and in
//! any companion components are patched to the final names, so the shared
//! TZID namespace stays consistent.

use std::collections::HashMap;

use super::catalog::{self, ZoneDefinition, ZoneLookupError};
use super::timezone::match_tzid;
use crate::ical::build::serialize_component;
use crate::ical::core::{CalendarDocument, Component, ComponentKind, Property};

/// Renaming gives up after this many candidate identifiers per zone.
const MAX_RENAME_ATTEMPTS: u32 = 100;

/// Error during timezone reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Every candidate name up to the attempt limit collides with a
    /// different stored definition.
    #[error("no collision-free identifier found for timezone {tzid}")]
    CollisionLimitExceeded {
        /// The zone that could not be placed.
        tzid: String,
    },

    /// A VTIMEZONE block carries no TZID property.
    #[error("VTIMEZONE block missing TZID")]
    MissingTzid,

    /// The external zone lookup failed.
    #[error(transparent)]
    ZoneLookup(#[from] ZoneLookupError),
}

/// Canonicalizes every VTIMEZONE in `document` against the system catalog
/// and the stored zones reachable through `zone_lookup`.
///
/// Zones that match a system zone are dropped and replaced by one appended
/// builtin definition per distinct system zone. Custom zones keep their
/// identifier when it is free or the stored definition is identical;
/// otherwise they are renamed to `"{tzid} 1"`, `"{tzid} 2"`, … and every
/// reference in `document` and `companions` is patched accordingly.
///
/// ## Errors
/// - [`ReconcileError::MissingTzid`] for a block without TZID.
/// - [`ReconcileError::CollisionLimitExceeded`] after 100 failed candidates.
/// - [`ReconcileError::ZoneLookup`] when the lookup itself fails; not-found
///   is not a failure.
pub fn reconcile<F>(
    document: &mut CalendarDocument,
    companions: &mut [Component],
    mut zone_lookup: F,
) -> Result<(), ReconcileError>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let mut rename_map: HashMap<String, String> = HashMap::new();
    let mut matched_builtins: Vec<String> = Vec::new();
    let mut dropped: Vec<usize> = Vec::new();

    for idx in 0..document.root.children.len() {
        let child = &document.root.children[idx];
        if child.kind != ComponentKind::Timezone {
            continue;
        }
        let tzid = child.tzid().ok_or(ReconcileError::MissingTzid)?.to_string();

        if let Some(canonical) = match_tzid(&tzid) {
            tracing::trace!(tzid = %tzid, canonical = %canonical, "timezone matches system zone");
            if !matched_builtins.contains(&canonical) {
                matched_builtins.push(canonical.clone());
            }
            if canonical != tzid {
                rename_map.insert(tzid, canonical);
            }
            dropped.push(idx);
            continue;
        }

        let winner = find_free_slot(child, &tzid, &mut zone_lookup)?;
        if winner != tzid {
            tracing::trace!(tzid = %tzid, renamed = %winner, "renaming colliding timezone");
            document.root.children[idx].set_property(Property::text("TZID", winner.clone()));
            rename_map.insert(tzid, winner);
        }
    }

    for idx in dropped.into_iter().rev() {
        document.root.children.remove(idx);
    }

    let mut rename = |old: &str| -> Option<String> {
        if let Some(new) = rename_map.get(old) {
            return Some(new.clone());
        }
        match_tzid(old).filter(|canonical| canonical != old)
    };
    for child in &mut document.root.children {
        child.patch_tzid_references(&mut rename);
    }
    for companion in companions.iter_mut() {
        companion.patch_tzid_references(&mut rename);
    }

    for canonical in matched_builtins {
        if let Some(definition) = catalog::builtin_definition(&canonical) {
            document.add_timezone(definition.component);
        }
    }

    Ok(())
}

/// Probes candidate identifiers for a custom zone until one is free or the
/// stored definition under it is identical.
///
/// Before comparing, the stored definition's suffixed TZID label is
/// rewritten back to the bare name, so a zone previously stored under
/// `"{tzid} 1"` still compares equal to its unrenamed twin.
fn find_free_slot<F>(
    block: &Component,
    tzid: &str,
    zone_lookup: &mut F,
) -> Result<String, ReconcileError>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let zonestr = serialize_component(block);

    for counter in 0..MAX_RENAME_ATTEMPTS {
        let candidate = if counter == 0 {
            tzid.to_string()
        } else {
            format!("{tzid} {counter}")
        };

        match zone_lookup(&candidate)? {
            None => return Ok(candidate),
            Some(existing) => {
                let stored = existing
                    .serialized_rules()
                    .replace(&format!("TZID:{candidate}"), &format!("TZID:{tzid}"));
                if stored == zonestr {
                    return Ok(candidate);
                }
            }
        }
    }

    Err(ReconcileError::CollisionLimitExceeded {
        tzid: tzid.to_string(),
    })
}
