//! In-memory profile collection with the default-profile pointer

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::constants::profile::DEFAULT_NAME;
use crate::error::{CoreError, CoreResult};

use super::{normalize, PartialProfile, Profile, ProfileId, ProfilePatch};

/// Profile records keyed by id, plus which one is the default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStore {
    profiles: BTreeMap<ProfileId, PartialProfile>,
    default_profile: Option<ProfileId>,
}

impl ProfileStore {
    pub fn new(profiles: BTreeMap<ProfileId, PartialProfile>, default_profile: Option<ProfileId>) -> Self {
        Self {
            profiles,
            default_profile,
        }
    }

    /// Create a profile with a conflict-free name
    ///
    /// `candidate` is normally the current timestamp; if it is already taken
    /// the next free id above it is used.
    pub fn create(&mut self, name: &str, candidate: ProfileId) -> ProfileId {
        let id = self.free_id(candidate);
        let name = self.unconflicting_name(name, id);
        info!(profile = %id, name = %name, "Creating profile");
        self.profiles.insert(id, PartialProfile::named(name));
        id
    }

    /// Insert or replace a raw stored record (used when loading storage)
    pub fn insert_raw(&mut self, id: ProfileId, raw: PartialProfile) {
        self.profiles.insert(id, raw);
    }

    /// Normalized profile
    pub fn read(&self, id: ProfileId) -> CoreResult<Profile> {
        self.read_raw(id).map(normalize)
    }

    /// Record exactly as stored
    pub fn read_raw(&self, id: ProfileId) -> CoreResult<&PartialProfile> {
        self.profiles.get(&id).ok_or(CoreError::ProfileNotFound(id))
    }

    /// Merge `patch` into a record; a new name goes through conflict resolution
    pub fn update(&mut self, id: ProfileId, patch: &ProfilePatch) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::ProfileNotFound(id));
        }

        let mut patch = patch.clone();
        if let Some(name) = patch.name.take() {
            patch.name = Some(self.unconflicting_name(&name, id));
        }

        if let Some(raw) = self.profiles.get_mut(&id) {
            raw.apply(&patch);
        }
        debug!(profile = %id, "Updated profile");
        Ok(())
    }

    /// Rename a profile, returning the name actually assigned
    pub fn rename(&mut self, id: ProfileId, name: &str) -> CoreResult<String> {
        let resolved = self.unconflicting_name(name, id);
        let raw = self
            .profiles
            .get_mut(&id)
            .ok_or(CoreError::ProfileNotFound(id))?;
        raw.name = Some(resolved.clone());
        info!(profile = %id, name = %resolved, "Renamed profile");
        Ok(resolved)
    }

    /// Record in the layout storage holds, replacing the in-memory copy
    ///
    /// Disabled colors become explicit nulls and the custom width is only
    /// kept for `width = other`, so a reload reads back the same profile.
    pub fn persisted_record(&mut self, id: ProfileId) -> CoreResult<Value> {
        let record = self.read(id)?.to_record();
        self.profiles.insert(id, PartialProfile::from_record(&record));
        Ok(record)
    }

    /// Remove a profile; references to it must be rewritten by the caller
    pub fn delete(&mut self, id: ProfileId) -> CoreResult<PartialProfile> {
        if self.is_default(id) {
            return Err(CoreError::ForbiddenOperation(format!(
                "profile {id} is the default profile and cannot be deleted"
            )));
        }
        let removed = self
            .profiles
            .remove(&id)
            .ok_or(CoreError::ProfileNotFound(id))?;
        info!(profile = %id, "Deleted profile");
        Ok(removed)
    }

    /// `(id, name)` pairs sorted case-insensitively by name
    pub fn list_all(&self) -> Vec<(ProfileId, String)> {
        let mut list: Vec<(ProfileId, String)> = self
            .profiles
            .iter()
            .map(|(id, raw)| (*id, display_name(raw).to_string()))
            .collect();
        list.sort_by(|(a_id, a), (b_id, b)| {
            a.to_uppercase()
                .cmp(&b.to_uppercase())
                .then_with(|| a_id.cmp(b_id))
        });
        list
    }

    /// Whether `id` is the default profile
    pub fn is_default(&self, id: ProfileId) -> bool {
        self.default_profile == Some(id)
    }

    pub fn default_id(&self) -> Option<ProfileId> {
        self.default_profile
    }

    pub fn set_default(&mut self, id: ProfileId) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::ProfileNotFound(id));
        }
        info!(profile = %id, "Default profile changed");
        self.default_profile = Some(id);
        Ok(())
    }

    /// Whether a record exists for `id`
    pub fn contains(&self, id: ProfileId) -> bool {
        self.profiles.contains_key(&id)
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Raw records in id order
    pub fn iter(&self) -> impl Iterator<Item = (&ProfileId, &PartialProfile)> {
        self.profiles.iter()
    }

    /// `name`, or `name (n)` with the smallest `n >= 2` not used by any
    /// profile other than `for_id`
    pub fn unconflicting_name(&self, name: &str, for_id: ProfileId) -> String {
        let mut candidate = name.to_string();
        let mut counter = 1;

        while self
            .profiles
            .iter()
            .any(|(id, raw)| *id != for_id && display_name(raw) == candidate)
        {
            counter += 1;
            candidate = format!("{name} ({counter})");
        }

        candidate
    }

    fn free_id(&self, candidate: ProfileId) -> ProfileId {
        let mut id = candidate;
        while self.profiles.contains_key(&id) {
            id = ProfileId(id.0 + 1);
        }
        id
    }
}

fn display_name(raw: &PartialProfile) -> &str {
    raw.name.as_deref().unwrap_or(DEFAULT_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Width;
    use serde_json::json;

    fn store_with_default() -> (ProfileStore, ProfileId) {
        let mut store = ProfileStore::default();
        let id = store.create("Default", ProfileId(1));
        store.set_default(id).unwrap();
        (store, id)
    }

    #[test]
    fn test_create_resolves_name_conflicts() {
        let mut store = ProfileStore::default();
        let a = store.create("Work", ProfileId(10));
        let b = store.create("Work", ProfileId(11));
        let c = store.create("Work", ProfileId(12));

        assert_eq!(store.read(a).unwrap().name, "Work");
        assert_eq!(store.read(b).unwrap().name, "Work (2)");
        assert_eq!(store.read(c).unwrap().name, "Work (3)");
    }

    #[test]
    fn test_name_conflicts_are_case_sensitive() {
        let mut store = ProfileStore::default();
        store.create("Work", ProfileId(10));
        let b = store.create("work", ProfileId(11));
        assert_eq!(store.read(b).unwrap().name, "work");
    }

    #[test]
    fn test_rename_ignores_own_name() {
        let mut store = ProfileStore::default();
        let a = store.create("Work", ProfileId(10));
        store.create("Home", ProfileId(11));

        assert_eq!(store.rename(a, "Work").unwrap(), "Work");
        assert_eq!(store.rename(a, "Home").unwrap(), "Home (2)");
    }

    #[test]
    fn test_rename_reuses_freed_name() {
        let mut store = ProfileStore::default();
        let a = store.create("Work", ProfileId(10));
        let b = store.create("Work", ProfileId(11));
        store.delete(a).unwrap();

        assert_eq!(store.rename(b, "Work").unwrap(), "Work");
    }

    #[test]
    fn test_create_avoids_id_collision() {
        let mut store = ProfileStore::default();
        let a = store.create("A", ProfileId(100));
        let b = store.create("B", ProfileId(100));
        assert_eq!(a, ProfileId(100));
        assert_eq!(b, ProfileId(101));
    }

    #[test]
    fn test_delete_default_forbidden() {
        let (mut store, id) = store_with_default();
        let err = store.delete(id).unwrap_err();
        assert!(matches!(err, CoreError::ForbiddenOperation(_)));
        assert!(store.contains(id));
    }

    #[test]
    fn test_delete_missing_not_found() {
        let (mut store, _) = store_with_default();
        assert!(store.delete(ProfileId(999)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_default_requires_existing_profile() {
        let (mut store, id) = store_with_default();
        assert!(store.set_default(ProfileId(42)).unwrap_err().is_not_found());
        assert!(store.is_default(id));
    }

    #[test]
    fn test_update_merges_patch() {
        let (mut store, id) = store_with_default();
        store
            .update(
                id,
                &ProfilePatch {
                    width: Some(Width::Thin),
                    ..ProfilePatch::default()
                },
            )
            .unwrap();

        let profile = store.read(id).unwrap();
        assert_eq!(profile.width, Width::Thin);
        assert_eq!(profile.name, "Default");
        assert!(store.update(ProfileId(7), &ProfilePatch::default()).is_err());
    }

    #[test]
    fn test_persisted_record_layout() {
        let (mut store, id) = store_with_default();
        store
            .update(
                id,
                &ProfilePatch {
                    width: Some(Width::Thin),
                    custom_width: Some((3, "em".into())),
                    colors: Some(None),
                    ..ProfilePatch::default()
                },
            )
            .unwrap();

        let record = store.persisted_record(id).unwrap();
        assert_eq!(record["width"], json!("thin"));
        assert_eq!(record["colorTrack"], Value::Null);
        assert_eq!(record["colorThumb"], Value::Null);
        assert!(record.get("customWidthValue").is_none());
        assert!(record.get("customWidthUnit").is_none());

        // Memory now matches what a reload would see
        assert_eq!(store.read_raw(id).unwrap(), &PartialProfile::from_record(&record));
    }

    #[test]
    fn test_list_all_sorted_by_name() {
        let mut store = ProfileStore::default();
        store.create("beta", ProfileId(1));
        store.create("Alpha", ProfileId(2));
        store.create("gamma", ProfileId(3));

        let names: Vec<String> = store.list_all().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
    }
}
