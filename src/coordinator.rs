//! Single owner of profiles, rules and page ports
//!
//! Every mutation runs as one pipeline: copy the state, apply the change to
//! the copy, persist it with a single awaited storage batch, commit the copy,
//! then tell connected pages to refetch. A failed write leaves the in-memory
//! state untouched. Callers that share a coordinator wrap it in
//! `Arc<tokio::sync::Mutex<_>>` so mutations never interleave.

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::constants::storage::{DEFAULT_PROFILE_KEY, LOCAL_FILE_PROFILE_KEY, RULES_KEY};
use crate::error::{CoreError, CoreResult};
use crate::ipc::{ChannelMessage, PortRegistry};
use crate::migration::{self, MigrationOutcome};
use crate::profile::{Profile, ProfileId, ProfilePatch, ProfileStore};
use crate::rules::{PageOrigin, RuleSet};
use crate::storage::layout::{self, profile_key, StoredState};
use crate::storage::{Batch, KeyQuery, StorageBackend};
use crate::style;

pub struct Coordinator<S: StorageBackend> {
    storage: S,
    clock: Box<dyn Clock>,
    profiles: ProfileStore,
    rules: RuleSet,
    default_profile: ProfileId,
    /// Applied stylesheet of the default profile, served to most pages
    default_css: String,
    ports: PortRegistry,
    migration: MigrationOutcome,
}

impl<S: StorageBackend> Coordinator<S> {
    /// Migrate storage if needed, then load it
    pub async fn init(storage: S, clock: Box<dyn Clock>) -> CoreResult<Self> {
        let migration = migration::migrate(&storage, clock.as_ref()).await?;
        debug!(outcome = ?migration, "Storage migration finished");

        let (state, default_profile) = load(&storage).await?;
        info!(
            profiles = state.profiles.len(),
            rules = state.rules.len(),
            default = %default_profile,
            "Loaded profile storage"
        );

        let default_css = style::generate_applied(&state.profiles.read(default_profile)?);
        Ok(Self {
            storage,
            clock,
            profiles: state.profiles,
            rules: state.rules,
            default_profile,
            default_css,
            ports: PortRegistry::new(),
            migration,
        })
    }

    /// Re-read everything from storage, discarding in-memory state
    pub async fn reload(&mut self) -> CoreResult<()> {
        let (state, default_profile) = load(&self.storage).await?;
        self.profiles = state.profiles;
        self.rules = state.rules;
        self.default_profile = default_profile;
        self.refresh_default_css()?;
        Ok(())
    }

    /// Backend this coordinator persists to
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// What the startup migration did
    pub fn migration_outcome(&self) -> MigrationOutcome {
        self.migration
    }

    /// Profile records as currently committed
    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Rule set as currently committed
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Id of the global default profile
    pub fn default_profile(&self) -> ProfileId {
        self.default_profile
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Normalized profile
    pub fn profile(&self, id: ProfileId) -> CoreResult<Profile> {
        self.profiles.read(id)
    }

    /// `(id, name)` pairs sorted case-insensitively by name
    pub fn list_profiles(&self) -> Vec<(ProfileId, String)> {
        self.profiles.list_all()
    }

    /// Create a profile with default settings and a conflict-free name
    pub async fn create_profile(&mut self, name: &str) -> CoreResult<ProfileId> {
        let mut profiles = self.profiles.clone();
        let id = profiles.create(name, self.clock.next_id());
        let batch = Batch::default().put(profile_key(id), profiles.persisted_record(id)?);

        self.commit(profiles, self.rules.clone(), batch).await?;
        Ok(id)
    }

    /// Merge `patch` into a profile and persist it
    pub async fn update_profile(&mut self, id: ProfileId, patch: &ProfilePatch) -> CoreResult<()> {
        let mut profiles = self.profiles.clone();
        profiles.update(id, patch)?;
        let batch = Batch::default().put(profile_key(id), profiles.persisted_record(id)?);

        self.commit(profiles, self.rules.clone(), batch).await
    }

    /// Rename, returning the conflict-free name that was stored
    pub async fn rename_profile(&mut self, id: ProfileId, name: &str) -> CoreResult<String> {
        let mut profiles = self.profiles.clone();
        let resolved = profiles.rename(id, name)?;
        let batch = Batch::default().put(profile_key(id), profiles.persisted_record(id)?);

        self.commit(profiles, self.rules.clone(), batch).await?;
        Ok(resolved)
    }

    /// Delete a profile and rewrite everything that referenced it
    ///
    /// Rules and the local-file pointer move to `reassign_to`, or are
    /// removed when it is `None`. Removal and rewrite land in one batch.
    pub async fn delete_profile(&mut self, id: ProfileId, reassign_to: Option<ProfileId>) -> CoreResult<()> {
        if let Some(to) = reassign_to {
            if to == id {
                return Err(CoreError::ForbiddenOperation(format!(
                    "cannot reassign rules of profile {id} to itself"
                )));
            }
            if !self.profiles.contains(to) {
                return Err(CoreError::ProfileNotFound(to));
            }
        }

        let mut profiles = self.profiles.clone();
        let mut rules = self.rules.clone();
        profiles.delete(id)?;
        let touched_local_file = rules.local_file_profile() == Some(id);
        let rewritten = rules.reassign(id, reassign_to);

        let mut batch = Batch::default().delete(profile_key(id));
        if rewritten > 0 {
            batch = batch.put(RULES_KEY, layout::encode_rules(&rules));
        }
        if touched_local_file {
            batch = local_file_entry(batch, rules.local_file_profile());
        }

        self.commit(profiles, rules, batch).await
    }

    /// Make `id` the profile used when no rule matches
    pub async fn set_default_profile(&mut self, id: ProfileId) -> CoreResult<()> {
        let mut profiles = self.profiles.clone();
        profiles.set_default(id)?;
        let batch = Batch::default().put(DEFAULT_PROFILE_KEY, layout::encode_id(id));

        self.commit(profiles, self.rules.clone(), batch).await
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Add a rule, returning its canonical pattern
    pub async fn add_rule(&mut self, profile: ProfileId, pattern: &str) -> CoreResult<String> {
        self.require_profile(profile)?;
        let mut rules = self.rules.clone();
        let key = rules.add_rule(profile, pattern)?.key();
        self.commit_rules(rules).await?;
        Ok(key)
    }

    /// Remove a rule; absent patterns are ignored
    pub async fn remove_rule(&mut self, pattern: &str) -> CoreResult<()> {
        let mut rules = self.rules.clone();
        if rules.remove_rule(pattern).is_none() {
            return Ok(());
        }
        self.commit_rules(rules).await
    }

    /// Point an existing rule at another profile
    pub async fn change_rule_profile(&mut self, pattern: &str, profile: ProfileId) -> CoreResult<()> {
        self.require_profile(profile)?;
        let mut rules = self.rules.clone();
        rules.change_rule_profile(pattern, profile)?;
        self.commit_rules(rules).await
    }

    /// Use `profile` for the page's host only, or drop the host rule on `None`
    pub async fn assign_page(&mut self, url: &str, profile: Option<ProfileId>) -> CoreResult<()> {
        if let Some(profile) = profile {
            self.require_profile(profile)?;
        }
        let origin = PageOrigin::from_url(url);
        let host = origin
            .host()
            .ok_or_else(|| CoreError::InvalidDomain(url.trim().to_string()))?;

        let mut rules = self.rules.clone();
        rules.assign_host(host, profile)?;
        self.commit_rules(rules).await
    }

    /// Profile for `file:` pages; `None` falls back to the default
    pub async fn set_local_file_profile(&mut self, profile: Option<ProfileId>) -> CoreResult<()> {
        if let Some(profile) = profile {
            self.require_profile(profile)?;
        }
        let mut rules = self.rules.clone();
        rules.set_local_file_profile(profile);
        let batch = local_file_entry(Batch::default(), profile);

        self.commit(self.profiles.clone(), rules, batch).await
    }

    // ------------------------------------------------------------------
    // Resolution and styles
    // ------------------------------------------------------------------

    /// Profile id for a page URL or bare hostname
    pub fn resolve(&self, url: &str) -> ProfileId {
        let origin = PageOrigin::from_url(url);
        self.rules.resolve_origin(&origin, self.default_profile)
    }

    /// Stylesheet to inject into the page at `url`
    pub fn css_for_url(&self, url: &str) -> CoreResult<String> {
        self.css_for_origin(&PageOrigin::from_url(url))
    }

    pub fn css_for_origin(&self, origin: &PageOrigin) -> CoreResult<String> {
        let id = self.rules.resolve_origin(origin, self.default_profile);
        if id == self.default_profile {
            return Ok(self.default_css.clone());
        }
        Ok(style::generate_applied(&self.profiles.read(id)?))
    }

    /// Preview stylesheet for a profile, without override handling
    pub fn preview_css(&self, id: ProfileId) -> CoreResult<String> {
        Ok(style::generate(&self.profiles.read(id)?))
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    /// Connect a page; returns the unique port name and its receiver
    pub fn connect(&mut self, name: &str, url: Option<&str>) -> (String, UnboundedReceiver<ChannelMessage>) {
        let origin = url.map(PageOrigin::from_url).unwrap_or(PageOrigin::General);
        self.ports.register(name, origin)
    }

    /// Drop a page's port
    pub fn disconnect(&mut self, name: &str) {
        self.ports.unregister(name);
    }

    /// Connected page ports
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// Handle a message that arrived on port `name`
    pub fn handle_message(&mut self, name: &str, message: ChannelMessage) -> CoreResult<()> {
        match message {
            ChannelMessage::GetCss => {
                let Some(port) = self.ports.get(name) else {
                    debug!(port = %name, "getCSS from unknown port");
                    return Ok(());
                };
                let css = self.css_for_origin(port.origin())?;
                self.ports.send(name, ChannelMessage::UpdateCss { css });
            }
            other => debug!(port = %name, message = ?other, "Ignoring unexpected message from port"),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    fn require_profile(&self, id: ProfileId) -> CoreResult<()> {
        if self.profiles.contains(id) {
            Ok(())
        } else {
            Err(CoreError::ProfileNotFound(id))
        }
    }

    fn refresh_default_css(&mut self) -> CoreResult<()> {
        self.default_css = style::generate_applied(&self.profiles.read(self.default_profile)?);
        Ok(())
    }

    async fn commit_rules(&mut self, rules: RuleSet) -> CoreResult<()> {
        let batch = Batch::default().put(RULES_KEY, layout::encode_rules(&rules));
        self.commit(self.profiles.clone(), rules, batch).await
    }

    async fn commit(&mut self, profiles: ProfileStore, rules: RuleSet, batch: Batch) -> CoreResult<()> {
        if let Err(e) = self.storage.apply(batch).await {
            error!(error = %e, "Storage write failed, operation not applied");
            // A backend without atomic batches may have applied part of it
            if let Err(reload) = self.reload().await {
                warn!(error = %reload, "Could not resync state from storage");
            }
            return Err(e.into());
        }

        if let Some(id) = profiles.default_id() {
            self.default_profile = id;
        }
        self.profiles = profiles;
        self.rules = rules;
        self.refresh_default_css()?;

        self.ports.broadcast(&ChannelMessage::QueryCss);
        Ok(())
    }
}

fn local_file_entry(batch: Batch, profile: Option<ProfileId>) -> Batch {
    match profile {
        Some(id) => batch.put(LOCAL_FILE_PROFILE_KEY, layout::encode_id(id)),
        None => batch.delete(LOCAL_FILE_PROFILE_KEY),
    }
}

async fn load<S: StorageBackend + ?Sized>(storage: &S) -> CoreResult<(StoredState, ProfileId)> {
    let record = storage.get(KeyQuery::All).await?;
    let state = layout::decode_state(&record);
    let default_profile = state.profiles.default_id().ok_or_else(|| {
        CoreError::InconsistentStorage("no usable default profile after migration".into())
    })?;
    Ok((state, default_profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppingClock;
    use crate::profile::Width;
    use crate::storage::MemoryStorage;
    use serde_json::{json, Value};

    async fn coordinator_with(value: Value) -> Coordinator<MemoryStorage> {
        let storage = MemoryStorage::with_record(value.as_object().cloned().unwrap());
        Coordinator::init(storage, Box::new(SteppingClock::starting_at(10_000)))
            .await
            .unwrap()
    }

    async fn scenario() -> Coordinator<MemoryStorage> {
        coordinator_with(json!({
            "schema": 2,
            "defaultProfile": 1,
            "rules": {
                "*.example.com": "profile_5",
                "mail.example.com": "profile_7"
            },
            "profile_1": { "name": "Default" },
            "profile_5": { "name": "Wide", "width": "auto" },
            "profile_7": { "name": "Thin", "width": "thin" }
        }))
        .await
    }

    #[tokio::test]
    async fn test_init_migrates_legacy_storage() {
        let coordinator = coordinator_with(json!({ "width": "thin", "colorTrack": "#fff" })).await;
        let id = coordinator.default_profile();

        assert!(matches!(coordinator.migration_outcome(), MigrationOutcome::Migrated { .. }));
        let profile = coordinator.profile(id).unwrap();
        assert_eq!(profile.width, Width::Thin);
        assert_eq!(profile.colors, None);
        assert_eq!(coordinator.resolve("https://anything.org/"), id);
    }

    #[tokio::test]
    async fn test_resolution_scenario() {
        let c = scenario().await;
        assert_eq!(c.resolve("https://mail.example.com/inbox"), ProfileId(7));
        assert_eq!(c.resolve("x.mail.example.com"), ProfileId(5));
        assert_eq!(c.resolve("example.com"), ProfileId(5));
        assert_eq!(c.resolve("other.org"), ProfileId(1));
        assert_eq!(c.resolve("file:///tmp/a.html"), ProfileId(1));
    }

    #[tokio::test]
    async fn test_delete_with_null_reassign() {
        let mut c = scenario().await;
        c.delete_profile(ProfileId(5), None).await.unwrap();

        assert_eq!(c.resolve("x.mail.example.com"), ProfileId(1));
        let data = c.storage().snapshot().await;
        assert!(data.get("profile_5").is_none());
        assert_eq!(data["rules"], json!({ "mail.example.com": "profile_7" }));
    }

    #[tokio::test]
    async fn test_delete_with_reassign_moves_local_file_pointer() {
        let mut c = scenario().await;
        c.set_local_file_profile(Some(ProfileId(7))).await.unwrap();
        c.delete_profile(ProfileId(7), Some(ProfileId(5))).await.unwrap();

        assert_eq!(c.resolve("mail.example.com"), ProfileId(5));
        assert_eq!(c.resolve("file:///x.html"), ProfileId(5));
        let data = c.storage().snapshot().await;
        assert_eq!(data["localFileProfile"], json!(5));
        assert_eq!(
            data["rules"],
            json!({ "*.example.com": "profile_5", "mail.example.com": "profile_5" })
        );
    }

    #[tokio::test]
    async fn test_delete_default_forbidden() {
        let mut c = scenario().await;
        assert!(matches!(
            c.delete_profile(ProfileId(1), None).await,
            Err(CoreError::ForbiddenOperation(_))
        ));
        assert!(c.delete_profile(ProfileId(5), Some(ProfileId(404))).await.unwrap_err().is_not_found());
        assert!(c.profiles().contains(ProfileId(5)));
    }

    #[tokio::test]
    async fn test_failed_delete_changes_nothing() {
        let mut c = scenario().await;
        let before = c.storage().snapshot().await;
        c.storage().set_fail_writes(true);

        let result = c.delete_profile(ProfileId(5), None).await;
        assert!(matches!(result, Err(CoreError::Storage(_))));

        assert!(c.profiles().contains(ProfileId(5)));
        assert_eq!(c.resolve("example.com"), ProfileId(5));
        assert_eq!(c.storage().snapshot().await, before);
    }

    #[tokio::test]
    async fn test_create_and_rename_persist() {
        let mut c = scenario().await;
        let a = c.create_profile("Work").await.unwrap();
        let b = c.create_profile("Work").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(c.profile(b).unwrap().name, "Work (2)");

        assert_eq!(c.rename_profile(b, "Thin").await.unwrap(), "Thin (2)");
        let data = c.storage().snapshot().await;
        assert_eq!(data[&profile_key(b)]["name"], json!("Thin (2)"));
    }

    #[tokio::test]
    async fn test_update_persists_record_layout() {
        let mut c = coordinator_with(json!({
            "schema": 2,
            "defaultProfile": 1,
            "profile_1": { "name": "Default", "colorTrack": "#000000FF", "colorThumb": "#FFFFFFFF" }
        }))
        .await;

        c.update_profile(
            ProfileId(1),
            &ProfilePatch {
                width: Some(Width::Thin),
                custom_width: Some((3, "em".into())),
                colors: Some(None),
                ..ProfilePatch::default()
            },
        )
        .await
        .unwrap();

        let stored = c.storage().snapshot().await["profile_1"].clone();
        assert_eq!(stored["width"], json!("thin"));
        assert_eq!(stored["colorTrack"], Value::Null);
        assert_eq!(stored["colorThumb"], Value::Null);
        assert!(stored.get("customWidthValue").is_none());
        assert!(stored.get("customWidthUnit").is_none());

        let before = c.profile(ProfileId(1)).unwrap();
        c.reload().await.unwrap();
        assert_eq!(c.profile(ProfileId(1)).unwrap(), before);
    }

    #[tokio::test]
    async fn test_custom_width_persisted_for_other() {
        let mut c = scenario().await;
        c.update_profile(
            ProfileId(5),
            &ProfilePatch {
                width: Some(Width::Other),
                custom_width: Some((3, "em".into())),
                ..ProfilePatch::default()
            },
        )
        .await
        .unwrap();

        let stored = c.storage().snapshot().await["profile_5"].clone();
        assert_eq!(stored["customWidthValue"], json!(3));
        assert_eq!(stored["customWidthUnit"], json!("em"));
    }

    #[tokio::test]
    async fn test_load_without_default_is_inconsistent() {
        let storage = MemoryStorage::with_record(
            json!({ "schema": 2, "profile_3": {} }).as_object().cloned().unwrap(),
        );
        assert!(matches!(load(&storage).await, Err(CoreError::InconsistentStorage(_))));
    }

    #[tokio::test]
    async fn test_set_default_profile() {
        let mut c = scenario().await;
        c.set_default_profile(ProfileId(7)).await.unwrap();
        assert_eq!(c.default_profile(), ProfileId(7));
        assert_eq!(c.resolve("other.org"), ProfileId(7));
        assert_eq!(c.storage().snapshot().await["defaultProfile"], json!(7));

        assert!(c.set_default_profile(ProfileId(99)).await.is_err());
        assert_eq!(c.default_profile(), ProfileId(7));
    }

    #[tokio::test]
    async fn test_rule_operations() {
        let mut c = scenario().await;
        assert!(matches!(c.add_rule(ProfileId(7), "*.example.com").await, Err(CoreError::DuplicateRule(_))));
        assert!(matches!(c.add_rule(ProfileId(7), "bad").await, Err(CoreError::InvalidDomain(_))));
        assert!(c.add_rule(ProfileId(99), "new.org").await.unwrap_err().is_not_found());

        assert_eq!(c.add_rule(ProfileId(7), "*.News.org").await.unwrap(), "*.news.org");
        assert_eq!(c.resolve("a.news.org"), ProfileId(7));

        c.change_rule_profile("*.news.org", ProfileId(5)).await.unwrap();
        assert_eq!(c.resolve("a.news.org"), ProfileId(5));

        c.remove_rule("*.news.org").await.unwrap();
        c.remove_rule("*.news.org").await.unwrap();
        assert_eq!(c.resolve("a.news.org"), ProfileId(1));
    }

    #[tokio::test]
    async fn test_assign_page() {
        let mut c = scenario().await;
        c.assign_page("https://shop.example.com/cart", Some(ProfileId(7))).await.unwrap();
        assert_eq!(c.resolve("shop.example.com"), ProfileId(7));

        c.assign_page("https://shop.example.com/", None).await.unwrap();
        assert_eq!(c.resolve("shop.example.com"), ProfileId(5));

        assert!(matches!(
            c.assign_page("file:///tmp/x", Some(ProfileId(7))).await,
            Err(CoreError::InvalidDomain(_))
        ));
    }

    #[tokio::test]
    async fn test_get_css_uses_port_origin() {
        let mut c = scenario().await;
        let (name, mut rx) = c.connect("1", Some("https://mail.example.com/"));

        c.handle_message(&name, ChannelMessage::GetCss).unwrap();
        let expected = style::generate_applied(&c.profile(ProfileId(7)).unwrap());
        assert_eq!(rx.try_recv().unwrap(), ChannelMessage::UpdateCss { css: expected });
    }

    #[tokio::test]
    async fn test_mutation_broadcasts_query() {
        let mut c = scenario().await;
        let (_, mut first) = c.connect("1", None);
        let (second_name, mut second) = c.connect("1", None);
        assert_eq!(second_name, "1-2");

        c.update_profile(
            ProfileId(1),
            &ProfilePatch {
                width: Some(Width::None),
                ..ProfilePatch::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(first.try_recv().unwrap(), ChannelMessage::QueryCss);
        assert_eq!(second.try_recv().unwrap(), ChannelMessage::QueryCss);

        c.disconnect(&second_name);
        c.create_profile("Another").await.unwrap();
        assert_eq!(c.ports().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_notify() {
        let mut c = scenario().await;
        let (_, mut rx) = c.connect("1", None);
        c.storage().set_fail_writes(true);

        assert!(c.create_profile("Nope").await.is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(c.profiles().len(), 3);
    }
}
