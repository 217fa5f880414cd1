//! The contract a type must meet to live in a [`LocalStore`](crate::LocalStore).
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// A timestamped, id-addressed entity persisted as part of one JSON array.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Fields supplied by the caller on creation.
    type Draft;

    /// Fields that may be replaced on update. Absent fields keep their value.
    ///
    /// Patches never carry `id` or `created_at`, so those cannot be
    /// overwritten by an update.
    type Patch;

    /// Fixed storage key for the collection.
    const STORAGE_KEY: &'static str;

    /// Builds a new record with `created_at == updated_at == now`.
    fn from_draft(id: String, now: DateTime<Utc>, draft: Self::Draft) -> Self;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Shallow-merges the present fields of `patch`.
    fn apply_patch(&mut self, patch: Self::Patch);

    /// Title used for ranking search results.
    fn title(&self) -> &str;

    /// Body text used for ranking search results.
    fn search_text(&self) -> String;

    /// Tags carried by the record. Records without tags return nothing.
    fn tags(&self) -> Vec<&str> {
        Vec::new()
    }
}
