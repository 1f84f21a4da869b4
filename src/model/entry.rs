use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One spoken line pulled out of a script file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DialogueEntry {
    pub identity: String,

    #[serde(default)]
    pub line_number: usize,

    #[serde(default)]
    pub text: String,
}

/// What to do when two lines of the same file resolve to the same identity.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// The later line replaces the earlier one (keeps the earlier position).
    #[default]
    LastWins,
    /// Every line is kept; repeats get a positional `#n` suffix.
    Sequence,
}

impl From<&str> for IdentityPolicy {
    fn from(s: &str) -> Self {
        match s {
            "sequence" => IdentityPolicy::Sequence,
            _ => IdentityPolicy::LastWins,
        }
    }
}

/// Ordered identity -> entry mapping for one file, in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueSet {
    entries: Vec<DialogueEntry>,
    index: HashMap<String, usize>,
    repeats: HashMap<String, usize>,
    policy: IdentityPolicy,
}

impl DialogueSet {
    pub fn new(policy: IdentityPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, identity: String, line_number: usize, text: String) {
        let identity = match self.policy {
            IdentityPolicy::LastWins => identity,
            IdentityPolicy::Sequence => {
                let seen = self.repeats.entry(identity.clone()).or_insert(0);
                *seen += 1;
                if *seen == 1 {
                    identity
                } else {
                    format!("{identity}#{seen}")
                }
            }
        };

        let entry = DialogueEntry {
            identity: identity.clone(),
            line_number,
            text,
        };

        match self.index.get(&identity) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.index.insert(identity, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<&DialogueEntry> {
        self.index.get(identity).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DialogueEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DialogueEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_wins_keeps_first_position() {
        let mut set = DialogueSet::new(IdentityPolicy::LastWins);
        set.insert("msg:1".into(), 1, "first".into());
        set.insert("7".into(), 7, "other".into());
        set.insert("msg:1".into(), 3, "second".into());

        assert_eq!(set.len(), 2);
        assert_eq!(set.entries()[0].text, "second");
        assert_eq!(set.entries()[0].line_number, 3);
        assert_eq!(set.entries()[1].identity, "7");
    }

    #[test]
    fn test_sequence_policy_suffixes_repeats() {
        let mut set = DialogueSet::new(IdentityPolicy::Sequence);
        set.insert("msg:1".into(), 1, "a".into());
        set.insert("msg:1".into(), 2, "b".into());
        set.insert("msg:1".into(), 3, "c".into());

        let ids: Vec<_> = set.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(ids, vec!["msg:1", "msg:1#2", "msg:1#3"]);
        assert_eq!(set.get("msg:1#2").map(|e| e.text.as_str()), Some("b"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(IdentityPolicy::from("sequence"), IdentityPolicy::Sequence);
        assert_eq!(IdentityPolicy::from("anything"), IdentityPolicy::LastWins);
    }
}
