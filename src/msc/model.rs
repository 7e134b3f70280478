use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::buffer::VarType;

/// Property bag attached to a component.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Name-keyed map that keeps insertion order. Entity type ids and sprite ids are derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &V)> {
        self.entries.get(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Replaces the value in place when the key exists, otherwise appends.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Appends only when the key is absent. Returns whether the value was stored.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.position(key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVar {
    pub addr: usize,
    #[serde(rename = "type")]
    pub ty: VarType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateDef {
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<String>,
    pub components: OrderedMap<Props>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<String>,
    pub inputs: BTreeMap<String, String>,
    pub components: OrderedMap<Props>,
    pub states: OrderedMap<StateDef>,
}

impl EntityDef {
    /// Health written into a freshly spawned slot.
    pub fn initial_health(&self) -> i64 {
        self.components
            .get("Health")
            .and_then(|props| props.get("max"))
            .and_then(serde_json::Value::as_f64)
            .map_or(100, |max| max.round() as i64)
    }

    /// Component ids in first-seen order across the base bag and every state override.
    pub fn all_component_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.components.keys().collect();
        for state in self.states.values() {
            for id in state.components.keys() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDef {
    pub trigger: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SpriteDef {
    Grid { col: u32, row: u32, frames: u32 },
    Absolute { x: i32, y: i32, w: u32, h: u32, ox: i32, oy: i32 },
}

impl SpriteDef {
    /// Number of consecutive sprite ids this definition consumes.
    pub fn id_count(&self) -> u32 {
        match self {
            SpriteDef::Grid { frames, .. } => (*frames).max(1),
            SpriteDef::Absolute { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
    pub repeat: bool,
    pub parallax_x: f32,
    pub parallax_y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum LayerDef {
    Entities,
    Parallax {
        source: String,
        repeat: bool,
        #[serde(rename = "parallaxX")]
        parallax_x: f32,
        #[serde(rename = "parallaxY")]
        parallax_y: f32,
    },
    Terrain {
        source: String,
        repeat: bool,
    },
    #[serde(rename = "UI")]
    Ui {
        source: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceDef {
    pub entity: String,
    pub x: i64,
    pub y: i64,
}

pub const DEFAULT_SPRITE_GRID: u32 = 16;

/// A parsed (and possibly import-merged) MSC script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub imports: Vec<String>,
    pub schema: OrderedMap<SchemaVar>,
    pub entities: OrderedMap<EntityDef>,
    pub events: Vec<EventDef>,
    pub sprites: OrderedMap<SpriteDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprite_grid: Option<u32>,
    pub backgrounds: Vec<BackgroundDef>,
    pub layers: Vec<LayerDef>,
    pub inputs: BTreeMap<String, String>,
    pub instances: Vec<InstanceDef>,
}

impl Document {
    pub fn grid_size(&self) -> u32 {
        self.sprite_grid.unwrap_or(DEFAULT_SPRITE_GRID)
    }

    /// 1-based type id of an entity definition; `None` when unknown or past the byte range.
    pub fn type_id(&self, entity: &str) -> Option<u8> {
        let index = self.entities.position(entity)?;
        u8::try_from(index + 1).ok()
    }

    pub fn entity_by_type(&self, type_id: u8) -> Option<(&str, &EntityDef)> {
        let index = (type_id as usize).checked_sub(1)?;
        self.entities.get_index(index)
    }

    /// Folds an already-resolved import into this document. Existing definitions win.
    pub fn merge_import(&mut self, import: Document) {
        for (name, var) in import.schema.entries {
            self.schema.insert_if_absent(name, var);
        }
        for (name, entity) in import.entities.entries {
            self.entities.insert_if_absent(name, entity);
        }
        self.events.extend(import.events);
        for (name, sprite) in import.sprites.entries {
            self.sprites.insert_if_absent(name, sprite);
        }
        if self.sprite_grid.is_none() {
            self.sprite_grid = import.sprite_grid;
        }
        for (key, action) in import.inputs {
            self.inputs.entry(key).or_insert(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(visual: &str) -> EntityDef {
        EntityDef { visual: Some(visual.to_string()), ..EntityDef::default() }
    }

    #[test]
    fn ordered_map_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("b", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&3), "insert replaces in place");
        assert!(!map.insert_if_absent("a", 9));
        assert_eq!(map.get("a"), Some(&2));
    }

    #[test]
    fn type_ids_are_one_based() {
        let mut doc = Document::default();
        doc.entities.insert("Hero", entity("hero"));
        doc.entities.insert("Coin", entity("coin"));
        assert_eq!(doc.type_id("Hero"), Some(1));
        assert_eq!(doc.type_id("Coin"), Some(2));
        assert_eq!(doc.entity_by_type(2).map(|(name, _)| name), Some("Coin"));
        assert!(doc.entity_by_type(0).is_none());
    }

    #[test]
    fn merge_prefers_existing_definitions() {
        let mut main = Document::default();
        main.entities.insert("Hero", entity("main_hero.png"));
        main.events.push(EventDef { trigger: "OnFrame".into(), actions: vec!["State.$a += 1".into()] });

        let mut other = Document::default();
        other.entities.insert("Hero", entity("other_hero.png"));
        other.entities.insert("Slime", entity("slime.png"));
        other.events.push(EventDef { trigger: "OnFrame".into(), actions: vec!["State.$b += 1".into()] });
        other.sprite_grid = Some(8);

        main.merge_import(other);
        assert_eq!(main.entities.get("Hero").and_then(|e| e.visual.as_deref()), Some("main_hero.png"));
        assert_eq!(main.entities.keys().collect::<Vec<_>>(), vec!["Hero", "Slime"]);
        assert_eq!(main.events.len(), 2);
        assert_eq!(main.events[0].actions[0], "State.$a += 1", "importer events come first");
        assert_eq!(main.grid_size(), 8);
    }

    #[test]
    fn initial_health_reads_health_max() {
        let mut def = EntityDef::default();
        assert_eq!(def.initial_health(), 100);
        let mut props = Props::new();
        props.insert("max".into(), serde_json::json!(3));
        def.components.insert("Health", props);
        assert_eq!(def.initial_health(), 3);
    }
}
