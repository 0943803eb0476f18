//! Strict DNS hostname grammar used for rule patterns and page hosts

use crate::constants::hostname::{MAX_HOST_LEN, MAX_LABEL_LEN};

/// Whether `host` is a dotted DNS name the rule engine will match against
///
/// At least two labels of 1-63 `[A-Za-z0-9-]`, none starting or ending with
/// a hyphen, and an alphabetic final label of two or more characters.
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return false;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|label| is_valid_label(label)) {
        return false;
    }

    labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Trimmed, lowercased hostname if it passes [`is_valid_hostname`]
pub fn canonical_hostname(host: &str) -> Option<String> {
    let host = host.trim().to_ascii_lowercase();
    is_valid_hostname(&host).then_some(host)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
