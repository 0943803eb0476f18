//! Upgrade of single-profile legacy storage to the schema v2 layout
//!
//! Legacy (v1) storage is one flat settings record. Migration wraps it as
//! the record of a new profile and points `defaultProfile` at it. The new
//! profile, the pointer and the schema marker are written in one `set`
//! before any legacy key is removed, so the pointer is never visible
//! without its profile. A failed write leaves the legacy data in place and
//! the whole migration runs again on the next start.

use serde_json::Value;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::constants::profile::{DEFAULT_NAME, MIGRATED_NAME};
use crate::constants::storage::{CURRENT_SCHEMA, DEFAULT_PROFILE_KEY, SCHEMA_KEY};
use crate::error::{CoreError, CoreResult};
use crate::profile::ProfileId;
use crate::storage::layout::{self, profile_key};
use crate::storage::{KeyQuery, Record, StorageBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Storage already had a valid default pointer
    AlreadyCurrent,
    /// Legacy settings were wrapped into a new default profile
    Migrated { default_profile: ProfileId },
    /// Storage was empty; a fresh default profile was created
    Initialized { default_profile: ProfileId },
    /// v2 storage had a missing or dangling default pointer
    Repaired { default_profile: ProfileId },
}

impl MigrationOutcome {
    pub fn default_profile(&self) -> Option<ProfileId> {
        match self {
            MigrationOutcome::AlreadyCurrent => None,
            MigrationOutcome::Migrated { default_profile }
            | MigrationOutcome::Initialized { default_profile }
            | MigrationOutcome::Repaired { default_profile } => Some(*default_profile),
        }
    }
}

/// Bring storage up to the current schema. Idempotent.
pub async fn migrate<S>(storage: &S, clock: &dyn Clock) -> CoreResult<MigrationOutcome>
where
    S: StorageBackend + ?Sized,
{
    let stored = storage.get(KeyQuery::All).await?;
    let schema = layout::schema_version(&stored);

    match layout::default_pointer(&stored) {
        Some(id) if stored.contains_key(&profile_key(id)) => {
            return Ok(MigrationOutcome::AlreadyCurrent);
        }
        Some(id) => {
            warn!(profile = %id, "Default profile pointer is dangling, repairing");
            return repair(storage, &stored, clock).await;
        }
        None => {}
    }

    if schema.is_none_or(|version| version < CURRENT_SCHEMA) {
        warn!(schema = ?schema, "Old storage schema detected. Migrating data.");
        migrate_legacy(storage, stored, clock).await
    } else {
        warn!(schema = ?schema, "Storage has no default profile, repairing");
        repair(storage, &stored, clock).await
    }
}

async fn migrate_legacy<S>(storage: &S, stored: Record, clock: &dyn Clock) -> CoreResult<MigrationOutcome>
where
    S: StorageBackend + ?Sized,
{
    let id = clock.next_id();
    let key = profile_key(id);

    let mut blob = stored.clone();
    blob.remove(SCHEMA_KEY);
    let fresh = blob.is_empty();
    let name = if fresh { DEFAULT_NAME } else { MIGRATED_NAME };
    blob.insert("name".into(), Value::String(name.to_string()));

    let mut write = Record::new();
    write.insert(SCHEMA_KEY.into(), Value::from(CURRENT_SCHEMA));
    write.insert(DEFAULT_PROFILE_KEY.into(), layout::encode_id(id));
    write.insert(key.clone(), Value::Object(blob));
    storage.set(write).await.map_err(CoreError::MigrationFailure)?;

    // The new layout is authoritative from here on; leftovers are inert
    let stale: Vec<String> = stored
        .keys()
        .filter(|k| k.as_str() != SCHEMA_KEY && k.as_str() != DEFAULT_PROFILE_KEY && **k != key)
        .cloned()
        .collect();
    if !stale.is_empty() {
        if let Err(e) = storage.remove(stale.clone()).await {
            warn!(error = %e, keys = ?stale, "Failed to remove legacy keys after migration");
        }
    }

    if fresh {
        info!(profile = %id, "Initialized storage with a default profile");
        Ok(MigrationOutcome::Initialized { default_profile: id })
    } else {
        info!(profile = %id, "Migrated legacy settings into profile");
        Ok(MigrationOutcome::Migrated { default_profile: id })
    }
}

/// Point `defaultProfile` at the lowest existing profile, or create one
async fn repair<S>(storage: &S, stored: &Record, clock: &dyn Clock) -> CoreResult<MigrationOutcome>
where
    S: StorageBackend + ?Sized,
{
    let mut write = Record::new();
    write.insert(SCHEMA_KEY.into(), Value::from(CURRENT_SCHEMA));

    let id = match layout::profile_ids(stored).min() {
        Some(id) => id,
        None => {
            let id = clock.next_id();
            let mut record = serde_json::Map::new();
            record.insert("name".into(), Value::String(DEFAULT_NAME.to_string()));
            write.insert(profile_key(id), Value::Object(record));
            id
        }
    };
    write.insert(DEFAULT_PROFILE_KEY.into(), layout::encode_id(id));

    storage.set(write).await.map_err(CoreError::MigrationFailure)?;
    info!(profile = %id, "Default profile pointer repaired");
    Ok(MigrationOutcome::Repaired { default_profile: id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppingClock;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn storage_with(value: Value) -> MemoryStorage {
        MemoryStorage::with_record(value.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_migrates_legacy_record() {
        let storage = storage_with(json!({ "width": "thin", "colorTrack": "#fff" }));
        let clock = SteppingClock::starting_at(1_000);

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { default_profile: ProfileId(1_000) });

        let data = storage.snapshot().await;
        assert_eq!(data.len(), 3);
        assert_eq!(data["schema"], json!(2));
        assert_eq!(data["defaultProfile"], json!(1_000));
        assert_eq!(
            data["profile_1000"],
            json!({ "width": "thin", "colorTrack": "#fff", "name": MIGRATED_NAME })
        );
        assert!(data.get("width").is_none());
        assert!(data.get("colorTrack").is_none());
    }

    #[tokio::test]
    async fn test_migrate_twice_is_noop() {
        let storage = storage_with(json!({ "width": "thin", "schema": 1 }));
        let clock = SteppingClock::starting_at(1_000);

        migrate(&storage, &clock).await.unwrap();
        let after_first = storage.snapshot().await;

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyCurrent);
        assert_eq!(storage.snapshot().await, after_first);
        assert!(after_first["profile_1000"].get("schema").is_none());
    }

    #[tokio::test]
    async fn test_current_schema_untouched() {
        let original = json!({
            "schema": 2,
            "defaultProfile": 5,
            "profile_5": { "name": "Mine" },
            "rules": { "example.com": "profile_5" }
        });
        let storage = storage_with(original.clone());
        let clock = SteppingClock::starting_at(1_000);

        assert_eq!(migrate(&storage, &clock).await.unwrap(), MigrationOutcome::AlreadyCurrent);
        assert_eq!(Value::Object(storage.snapshot().await), original);
    }

    #[tokio::test]
    async fn test_empty_storage_initializes_default() {
        let storage = MemoryStorage::new();
        let clock = SteppingClock::starting_at(42);

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Initialized { default_profile: ProfileId(42) });
        assert_eq!(storage.snapshot().await["profile_42"], json!({ "name": DEFAULT_NAME }));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_legacy_data() {
        let storage = storage_with(json!({ "width": "thin" }));
        storage.set_fail_writes(true);
        let clock = SteppingClock::starting_at(1_000);

        let err = migrate(&storage, &clock).await.unwrap_err();
        assert!(matches!(err, CoreError::MigrationFailure(_)));
        assert_eq!(Value::Object(storage.snapshot().await), json!({ "width": "thin" }));

        // Retried wholesale on the next start
        storage.set_fail_writes(false);
        let outcome = migrate(&storage, &clock).await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { .. }));
    }

    #[tokio::test]
    async fn test_repairs_missing_pointer() {
        let storage = storage_with(json!({
            "schema": 2,
            "profile_9": { "name": "B" },
            "profile_3": { "name": "A" }
        }));
        let clock = SteppingClock::starting_at(1_000);

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Repaired { default_profile: ProfileId(3) });
        assert_eq!(storage.snapshot().await["defaultProfile"], json!(3));
    }

    #[tokio::test]
    async fn test_string_schema_is_repaired_not_wrapped() {
        let storage = storage_with(json!({
            "schema": "2",
            "rules": { "example.com": "profile_4" },
            "profile_4": { "name": "Mine" }
        }));
        let clock = SteppingClock::starting_at(1_000);

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Repaired { default_profile: ProfileId(4) });
        let data = storage.snapshot().await;
        assert_eq!(data["rules"], json!({ "example.com": "profile_4" }));
        assert_eq!(data["profile_4"], json!({ "name": "Mine" }));
        assert!(data.get("profile_1000").is_none());
    }

    #[tokio::test]
    async fn test_repairs_dangling_pointer_without_profiles() {
        let storage = storage_with(json!({ "schema": 2, "defaultProfile": 77 }));
        let clock = SteppingClock::starting_at(500);

        let outcome = migrate(&storage, &clock).await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Repaired { default_profile: ProfileId(500) });
        let data = storage.snapshot().await;
        assert_eq!(data["defaultProfile"], json!(500));
        assert_eq!(data["profile_500"], json!({ "name": DEFAULT_NAME }));
    }
}
