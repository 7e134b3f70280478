use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Strips the optional `Action.` namespace so `Action.Jump` and `Jump` name the same action.
pub fn normalize_action(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix("Action.").unwrap_or(trimmed).trim()
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Input sampled by the host for one tick: held action identifiers plus raw held keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    #[serde(default)]
    active: BTreeSet<String>,
    #[serde(default)]
    keys: BTreeSet<String>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for action in actions {
            snapshot.press(action.as_ref());
        }
        snapshot
    }

    pub fn press(&mut self, action: &str) {
        let action = normalize_action(action);
        if !action.is_empty() {
            self.active.insert(action.to_string());
        }
    }

    pub fn release(&mut self, action: &str) {
        self.active.remove(normalize_action(action));
    }

    pub fn hold_key(&mut self, key: &str) {
        let key = normalize_key(key);
        if !key.is_empty() {
            self.keys.insert(key);
        }
    }

    pub fn is_active(&self, action: &str) -> bool {
        self.active.contains(normalize_action(action))
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.keys.is_empty()
    }
}

/// Key → actions table built from document `Input:` blocks and the engine config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBindings {
    key_to_actions: BTreeMap<String, Vec<String>>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document form: one action per key.
    pub fn from_key_map(map: &BTreeMap<String, String>) -> Self {
        let mut bindings = Self::default();
        for (key, action) in map {
            bindings.bind(key, action);
        }
        bindings
    }

    /// Config form: several keys per action.
    pub fn from_action_map(map: &BTreeMap<String, Vec<String>>) -> Self {
        let mut bindings = Self::default();
        for (action, keys) in map {
            if keys.is_empty() {
                eprintln!("[input] action '{action}' has no keys, ignoring.");
            }
            for key in keys {
                bindings.bind(key, action);
            }
        }
        bindings
    }

    pub fn bind(&mut self, key: &str, action: &str) {
        let key = normalize_key(key);
        let action = normalize_action(action);
        if key.is_empty() || action.is_empty() {
            eprintln!("[input] ignoring empty binding '{key}' -> '{action}'");
            return;
        }
        let actions = self.key_to_actions.entry(key).or_default();
        if !actions.iter().any(|existing| existing == action) {
            actions.push(action.to_string());
        }
    }

    /// Layers `other` underneath: keys already bound here keep their actions.
    pub fn merged_with(&self, other: &InputBindings) -> InputBindings {
        let mut merged = self.clone();
        for (key, actions) in &other.key_to_actions {
            merged.key_to_actions.entry(key.clone()).or_insert_with(|| actions.clone());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_actions.is_empty()
    }

    /// Snapshot with the actions of every held key added to the already active ones.
    pub fn apply(&self, snapshot: &InputSnapshot) -> InputSnapshot {
        let mut out = snapshot.clone();
        for key in snapshot.keys() {
            for action in self.key_to_actions.get(key).into_iter().flatten() {
                out.active.insert(action.clone());
            }
        }
        out
    }
}
