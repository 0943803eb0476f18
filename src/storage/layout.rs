//! Schema v2 key layout and `profile_<id>` reference translation
//!
//! Stored profile references are prefixed strings (`profile_123`) while the
//! rest of the crate works with bare [`ProfileId`]s. Nothing outside this
//! module builds or parses the prefix.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::constants::storage::{
    DEFAULT_PROFILE_KEY, LOCAL_FILE_PROFILE_KEY, PROFILE_PREFIX, RULES_KEY, SCHEMA_KEY,
};
use crate::profile::{PartialProfile, ProfileId, ProfileStore};
use crate::rules::{Rule, RuleSet};

use super::Record;

/// `profile_<id>`
pub fn profile_key(id: ProfileId) -> String {
    format!("{PROFILE_PREFIX}{id}")
}

/// Id from a `profile_<id>` key or reference
pub fn parse_profile_key(key: &str) -> Option<ProfileId> {
    key.strip_prefix(PROFILE_PREFIX)?.parse().ok()
}

/// Id stored as a bare pointer: a number or a numeric string
pub fn parse_id(value: &Value) -> Option<ProfileId> {
    match value {
        Value::Number(n) => n.as_i64().map(ProfileId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Id referenced by a rule: `profile_<id>`, tolerating a bare id
fn parse_rule_target(value: &Value) -> Option<ProfileId> {
    match value {
        Value::String(s) => parse_profile_key(s).or_else(|| s.parse().ok()),
        other => parse_id(other),
    }
}

/// Schema marker, stored as a number or a numeric string
pub fn schema_version(record: &Record) -> Option<i64> {
    match record.get(SCHEMA_KEY)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn default_pointer(record: &Record) -> Option<ProfileId> {
    record.get(DEFAULT_PROFILE_KEY).and_then(parse_id)
}

/// Every id that has a `profile_<id>` record
pub fn profile_ids(record: &Record) -> impl Iterator<Item = ProfileId> + '_ {
    record.keys().filter_map(|k| parse_profile_key(k))
}

/// In-memory state decoded from a v2 record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredState {
    pub profiles: ProfileStore,
    pub rules: RuleSet,
}

/// Decode profiles, the default pointer, rules and the local-file pointer
///
/// References to profiles that do not exist and rules with malformed
/// patterns are dropped with a warning.
pub fn decode_state(record: &Record) -> StoredState {
    let profiles: BTreeMap<ProfileId, PartialProfile> = record
        .iter()
        .filter_map(|(key, value)| {
            parse_profile_key(key).map(|id| (id, PartialProfile::from_record(value)))
        })
        .collect();

    let default_profile = default_pointer(record).filter(|id| profiles.contains_key(id));
    let exists = |id: &ProfileId| profiles.contains_key(id);

    let local_file_profile = record
        .get(LOCAL_FILE_PROFILE_KEY)
        .and_then(parse_id)
        .filter(|id| {
            let ok = exists(id);
            if !ok {
                warn!(profile = %id, "Local-file profile does not exist, ignoring");
            }
            ok
        });

    let mut rules = RuleSet::new(local_file_profile);
    if let Some(raw_rules) = record.get(RULES_KEY).and_then(Value::as_object) {
        for (pattern, target) in raw_rules {
            let Some(id) = parse_rule_target(target) else {
                warn!(rule = %pattern, target = %target, "Rule has an unreadable profile reference, dropping");
                continue;
            };
            if !exists(&id) {
                warn!(rule = %pattern, profile = %id, "Rule points at a missing profile, dropping");
                continue;
            }
            match Rule::parse(id, pattern) {
                Ok(rule) => rules.insert(rule),
                Err(e) => warn!(rule = %pattern, error = %e, "Dropping malformed rule"),
            }
        }
    }

    StoredState {
        profiles: ProfileStore::new(profiles, default_profile),
        rules,
    }
}

/// `rules` value: canonical pattern -> `profile_<id>`
pub fn encode_rules(rules: &RuleSet) -> Value {
    let map: Map<String, Value> = rules
        .iter()
        .map(|rule| (rule.key(), Value::String(profile_key(rule.profile))))
        .collect();
    Value::Object(map)
}

pub fn encode_id(id: ProfileId) -> Value {
    Value::from(id.as_i64())
}
