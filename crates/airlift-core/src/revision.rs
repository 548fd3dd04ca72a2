//! Release revision history
//!
//! Every successful apply snapshots the full resource set of a release as a
//! `Revision`. The history is append-only; rollback re-activates an older
//! snapshot rather than rewriting anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::{Resource, sort_by_canonical};

/// Where the flight binary came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// URL or filesystem path of the flight.
    #[serde(rename = "ref")]
    pub ref_: String,

    /// SHA-1 of the flight bytes.
    pub checksum: String,
}

/// One historical snapshot of a release's resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Random opaque identifier, unique within the release.
    pub name: String,

    pub source: Source,

    /// Strictly increasing within a release.
    pub created_at: DateTime<Utc>,

    /// The revision with the greatest `active_at` is the active one.
    pub active_at: DateTime<Utc>,

    /// Full resource set, sorted by canonical name.
    pub resources: Vec<Resource>,
}

impl Revision {
    /// Create a new revision, active as of now. Resources are sorted by
    /// canonical name so identical sets always serialize identically.
    pub fn new(release: &str, source: Source, mut resources: Vec<Resource>) -> Self {
        sort_by_canonical(&mut resources);
        let now = Utc::now();
        Self {
            name: format!("airlift.{}.{}", release, random_suffix()),
            source,
            created_at: now,
            active_at: now,
            resources,
        }
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

fn random_suffix() -> String {
    hex::encode(rand::random::<[u8; 6]>())
}

/// The ordered revision history of one release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Revisions {
    pub release: String,

    /// Ascending by `created_at`. User-facing revision IDs are 1-based
    /// positions in this order.
    pub history: Vec<Revision>,
}

impl Revisions {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            history: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// The active revision: greatest `active_at`, later entry winning ties.
    pub fn active(&self) -> Option<&Revision> {
        self.history
            .iter()
            .enumerate()
            .max_by_key(|(index, revision)| (revision.active_at, *index))
            .map(|(_, revision)| revision)
    }

    /// Resources of the active revision; empty for a release with no history.
    pub fn active_resources(&self) -> &[Resource] {
        self.active()
            .map(|revision| revision.resources.as_slice())
            .unwrap_or_default()
    }

    /// Look up a revision by 1-based user-facing ID.
    pub fn get(&self, id: usize) -> Option<&Revision> {
        if id == 0 {
            return None;
        }
        self.history.get(id - 1)
    }

    /// The 1-based ID of the active revision.
    pub fn active_id(&self) -> Option<usize> {
        let active = self.active()?;
        self.history
            .iter()
            .position(|revision| revision.name == active.name)
            .map(|index| index + 1)
    }
}
