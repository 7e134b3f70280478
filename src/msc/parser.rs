use std::collections::BTreeMap;

use serde_json::Value;

use super::model::{
    BackgroundDef, Document, EntityDef, EventDef, InstanceDef, LayerDef, OrderedMap, Props, SchemaVar,
    SpriteDef, StateDef,
};
use super::syntax::{self, format_number, Node, ParseError};
use crate::buffer::VarType;

pub const GRID_KEY: &str = "$Grid";
/// Sprite ids are stored in one byte and id 0 means "no sprite".
pub const MAX_SPRITE_FRAMES: u32 = 255;
const ENTITY_PREFIX: &str = "Entity.";

/// Parses MSC source text into a [`Document`].
///
/// Recoverable statements (empty imports, schema entries with a negative address) are dropped
/// silently; structural problems are reported as a [`ParseError`].
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    let root = syntax::read(source)?;
    let entries = match &root {
        Node::Map(entries) => entries.as_slice(),
        Node::Null => &[],
        other => return Err(ParseError::new(format!("expected top-level statements, found a {}", other.kind()))),
    };

    let mut doc = Document::default();
    for (key, value) in entries {
        if let Some(name) = key.strip_prefix(ENTITY_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ParseError::new("entity declaration is missing a name"));
            }
            let entity = parse_entity(name, value)?;
            doc.entities.insert(name, entity);
            continue;
        }
        match key.as_str() {
            "Source" => doc.source = value.to_text().filter(|s| !s.trim().is_empty()),
            "Import" => parse_imports(value, &mut doc.imports),
            "Schema" => parse_schema(value, &mut doc.schema)?,
            "Events" => doc.events.extend(parse_events(value)?),
            "Sprites" => parse_sprites(value, &mut doc)?,
            "Backgrounds" => doc.backgrounds.extend(parse_backgrounds(value)?),
            "Layers" => doc.layers.extend(parse_layers(value)?),
            "Input" => doc.inputs.extend(parse_bindings("Input", value)?),
            "Instances" => doc.instances.extend(parse_instances(value)?),
            _ => {}
        }
    }
    Ok(doc)
}

fn node_to_value(node: &Node) -> Value {
    match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                Value::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
            }
        }
        Node::Text(text) => Value::String(text.clone()),
        Node::List(items) => Value::Array(items.iter().map(node_to_value).collect()),
        Node::Map(entries) => Value::Object(node_to_props(entries)),
    }
}

fn node_to_props(entries: &[(String, Node)]) -> Props {
    entries.iter().map(|(k, v)| (k.clone(), node_to_value(v))).collect()
}

fn number(node: Option<&Node>, what: &str) -> Result<f64, ParseError> {
    node.and_then(Node::as_number).ok_or_else(|| ParseError::new(format!("{what} must be a number")))
}

fn number_or(node: Option<&Node>, default: f64, what: &str) -> Result<f64, ParseError> {
    match node {
        None | Some(Node::Null) => Ok(default),
        Some(node) => number(Some(node), what),
    }
}

fn text(node: Option<&Node>, what: &str) -> Result<String, ParseError> {
    node.and_then(Node::to_text)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ParseError::new(format!("{what} must be a non-empty string")))
}

fn flag_or(node: Option<&Node>, default: bool) -> bool {
    node.and_then(Node::as_bool).unwrap_or(default)
}

fn parse_imports(value: &Node, imports: &mut Vec<String>) {
    match value {
        Node::List(items) => items.iter().for_each(|item| parse_imports(item, imports)),
        other => {
            if let Some(path) = other.to_text() {
                let path = path.trim();
                if !path.is_empty() {
                    imports.push(path.to_string());
                }
            }
        }
    }
}

fn parse_schema_entry(name: &str, body: &Node, schema: &mut OrderedMap<SchemaVar>) -> Result<(), ParseError> {
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(ParseError::new("schema entry is missing a name"));
    }
    let addr = number(body.get("addr"), &format!("schema '{name}' addr"))?;
    if addr < 0.0 {
        return Ok(());
    }
    let ty = match body.get("type").and_then(Node::to_text) {
        None => VarType::Int8,
        Some(raw) => VarType::parse(&raw)
            .ok_or_else(|| ParseError::new(format!("schema '{name}' has unknown type '{raw}'")))?,
    };
    schema.insert(name, SchemaVar { addr: addr as usize, ty });
    Ok(())
}

fn parse_schema(value: &Node, schema: &mut OrderedMap<SchemaVar>) -> Result<(), ParseError> {
    match value {
        Node::List(items) => {
            for item in items {
                let name = text(item.get("name"), "schema entry name")?;
                parse_schema_entry(&name, item, schema)?;
            }
        }
        Node::Map(entries) => {
            for (name, body) in entries {
                parse_schema_entry(name, body, schema)?;
            }
        }
        Node::Null => {}
        other => return Err(ParseError::new(format!("Schema must be a list or object, found a {}", other.kind()))),
    }
    Ok(())
}

fn parse_bindings(owner: &str, value: &Node) -> Result<BTreeMap<String, String>, ParseError> {
    let mut out = BTreeMap::new();
    match value {
        Node::Map(entries) => {
            for (key, action) in entries {
                let action = text(Some(action), &format!("{owner} binding '{key}'"))?;
                out.insert(key.clone(), action);
            }
        }
        Node::Null => {}
        other => return Err(ParseError::new(format!("{owner} bindings must be an object, found a {}", other.kind()))),
    }
    Ok(out)
}

fn parse_entity(name: &str, value: &Node) -> Result<EntityDef, ParseError> {
    let mut entity = EntityDef::default();
    let entries = match value {
        Node::Map(entries) => entries.as_slice(),
        Node::Null => &[],
        other => {
            return Err(ParseError::new(format!("Entity.{name} must be an object, found a {}", other.kind())))
        }
    };
    for (key, body) in entries {
        match key.as_str() {
            "Visual" => entity.visual = body.to_text(),
            "Input" => entity.inputs = parse_bindings(&format!("Entity.{name}.Input"), body)?,
            "States" => entity.states = parse_states(name, body)?,
            _ => {
                if let Node::Map(props) = body {
                    entity.components.insert(key.clone(), node_to_props(props));
                }
            }
        }
    }
    Ok(entity)
}

fn parse_states(entity: &str, value: &Node) -> Result<OrderedMap<StateDef>, ParseError> {
    let mut states = OrderedMap::new();
    let entries = match value {
        Node::Map(entries) => entries.as_slice(),
        Node::Null => &[],
        other => {
            return Err(ParseError::new(format!("Entity.{entity}.States must be an object, found a {}", other.kind())))
        }
    };
    for (state_name, body) in entries {
        let condition = body
            .get("condition")
            .and_then(Node::to_text)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ParseError::new(format!("state '{state_name}' of Entity.{entity} is missing a condition"))
            })?;
        let mut state = StateDef { condition, ..StateDef::default() };
        for (key, override_body) in body.as_map().unwrap_or_default() {
            match key.as_str() {
                "condition" => {}
                "Visual" | "visual" => state.visual = override_body.to_text(),
                _ => {
                    if let Node::Map(props) = override_body {
                        state.components.insert(key.clone(), node_to_props(props));
                    }
                }
            }
        }
        states.insert(state_name.clone(), state);
    }
    Ok(states)
}

fn actions_of(node: &Node, trigger: &str) -> Result<Vec<String>, ParseError> {
    match node {
        Node::List(items) => items
            .iter()
            .map(|item| {
                item.to_text().ok_or_else(|| ParseError::new(format!("actions of '{trigger}' must be strings")))
            })
            .collect(),
        Node::Null => Ok(Vec::new()),
        other => other
            .to_text()
            .map(|action| vec![action])
            .ok_or_else(|| ParseError::new(format!("actions of '{trigger}' must be a string or list"))),
    }
}

fn parse_events(value: &Node) -> Result<Vec<EventDef>, ParseError> {
    let items = match value {
        Node::List(items) => items.as_slice(),
        Node::Null => &[],
        other => return Err(ParseError::new(format!("Events must be a list, found a {}", other.kind()))),
    };
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        if let Some(trigger) = item.get("trigger") {
            let trigger = text(Some(trigger), "event trigger")?;
            let actions = item.get("actions").map_or(Ok(Vec::new()), |a| actions_of(a, &trigger))?;
            events.push(EventDef { trigger, actions });
            continue;
        }
        match item.as_map() {
            Some([(trigger, actions)]) => {
                let actions = actions_of(actions, trigger)?;
                events.push(EventDef { trigger: trigger.clone(), actions });
            }
            _ => return Err(ParseError::new("each event needs a `trigger` and `actions`")),
        }
    }
    Ok(events)
}

fn parse_sprite(name: &str, body: &Node) -> Result<SpriteDef, ParseError> {
    match body {
        Node::List(cells) => {
            let nums: Vec<f64> = cells
                .iter()
                .map(|cell| number(Some(cell), &format!("sprite '{name}' cell")))
                .collect::<Result<_, _>>()?;
            match nums.as_slice() {
                [col, row] => Ok(SpriteDef::Grid { col: *col as u32, row: *row as u32, frames: 1 }),
                [_, _, frames] if *frames > f64::from(MAX_SPRITE_FRAMES) => Err(ParseError::new(format!(
                    "sprite '{name}' has {} frames; a sprite id is one byte, so at most {MAX_SPRITE_FRAMES}",
                    format_number(*frames)
                ))),
                [col, row, frames] if *frames >= 1.0 => {
                    Ok(SpriteDef::Grid { col: *col as u32, row: *row as u32, frames: *frames as u32 })
                }
                _ => Err(ParseError::new(format!("sprite '{name}' must be [col,row] or [col,row,frames>=1]"))),
            }
        }
        Node::Map(_) => {
            let field = |key: &str| number(body.get(key), &format!("sprite '{name}' {key}"));
            Ok(SpriteDef::Absolute {
                x: field("x")? as i32,
                y: field("y")? as i32,
                w: field("w")?.max(0.0) as u32,
                h: field("h")?.max(0.0) as u32,
                ox: number_or(body.get("ox"), 0.0, "sprite ox")? as i32,
                oy: number_or(body.get("oy"), 0.0, "sprite oy")? as i32,
            })
        }
        other => Err(ParseError::new(format!("sprite '{name}' must be a list or object, found a {}", other.kind()))),
    }
}

fn parse_sprites(value: &Node, doc: &mut Document) -> Result<(), ParseError> {
    let entries = match value {
        Node::Map(entries) => entries.as_slice(),
        Node::Null => &[],
        other => return Err(ParseError::new(format!("Sprites must be an object, found a {}", other.kind()))),
    };
    for (name, body) in entries {
        if name == GRID_KEY {
            let size = number(Some(body), "$Grid")?;
            if size < 1.0 {
                return Err(ParseError::new(format!("$Grid must be at least 1, got {}", format_number(size))));
            }
            doc.sprite_grid = Some(size as u32);
            continue;
        }
        let sprite = parse_sprite(name, body)?;
        doc.sprites.insert(name.clone(), sprite);
    }
    Ok(())
}

fn parse_background(name: Option<&str>, body: &Node) -> Result<BackgroundDef, ParseError> {
    if let Some(source) = body.as_text() {
        return Ok(BackgroundDef {
            name: name.map(str::to_string),
            source: source.to_string(),
            repeat: false,
            parallax_x: 1.0,
            parallax_y: 1.0,
        });
    }
    Ok(BackgroundDef {
        name: name.map(str::to_string),
        source: text(body.get("source"), "background source")?,
        repeat: flag_or(body.get("repeat"), false),
        parallax_x: number_or(body.get("parallaxX"), 1.0, "parallaxX")? as f32,
        parallax_y: number_or(body.get("parallaxY"), 1.0, "parallaxY")? as f32,
    })
}

fn parse_backgrounds(value: &Node) -> Result<Vec<BackgroundDef>, ParseError> {
    match value {
        Node::List(items) => items.iter().map(|item| parse_background(None, item)).collect(),
        Node::Map(entries) => entries.iter().map(|(name, body)| parse_background(Some(name), body)).collect(),
        Node::Null => Ok(Vec::new()),
        other => Err(ParseError::new(format!("Backgrounds must be a list, found a {}", other.kind()))),
    }
}

fn parse_layer(item: &Node) -> Result<LayerDef, ParseError> {
    if item.as_text() == Some("Entities") {
        return Ok(LayerDef::Entities);
    }
    let Some([(kind, body)]) = item.as_map() else {
        return Err(ParseError::new("layer must be \"Entities\" or a single-key object"));
    };
    match kind.as_str() {
        "Entities" => Ok(LayerDef::Entities),
        "Parallax" => Ok(LayerDef::Parallax {
            source: text(body.get("source"), "Parallax source")?,
            repeat: flag_or(body.get("repeat"), false),
            parallax_x: number_or(body.get("parallaxX"), 1.0, "parallaxX")? as f32,
            parallax_y: number_or(body.get("parallaxY"), 1.0, "parallaxY")? as f32,
        }),
        "Terrain" => Ok(LayerDef::Terrain {
            source: text(body.get("source"), "Terrain source")?,
            repeat: flag_or(body.get("repeat"), false),
        }),
        "UI" => Ok(LayerDef::Ui { source: text(body.get("source"), "UI source")? }),
        other => Err(ParseError::new(format!("unknown layer kind '{other}'"))),
    }
}

fn parse_layers(value: &Node) -> Result<Vec<LayerDef>, ParseError> {
    match value {
        Node::List(items) => items.iter().map(parse_layer).collect(),
        Node::Null => Ok(Vec::new()),
        other => Err(ParseError::new(format!("Layers must be a list, found a {}", other.kind()))),
    }
}

fn parse_instances(value: &Node) -> Result<Vec<InstanceDef>, ParseError> {
    let items = match value {
        Node::List(items) => items.as_slice(),
        Node::Null => &[],
        other => return Err(ParseError::new(format!("Instances must be a list, found a {}", other.kind()))),
    };
    items
        .iter()
        .map(|item| {
            Ok(InstanceDef {
                entity: text(item.get("entity"), "instance entity")?,
                x: number_or(item.get("x"), 0.0, "instance x")?.round() as i64,
                y: number_or(item.get("y"), 0.0, "instance y")?.round() as i64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_empty_imports_and_negative_addresses() {
        let doc = parse_document(
            "Import: lib.msc\nImport: \"\"\nImport: other.msc\nSchema:\n  - { name: score, addr: 64, type: Int16 }\n  - { name: bad, addr: -1 }\n",
        )
        .expect("parse");
        assert_eq!(doc.imports, vec!["lib.msc", "other.msc"]);
        assert_eq!(doc.schema.len(), 1);
        assert_eq!(doc.schema.get("score"), Some(&SchemaVar { addr: 64, ty: VarType::Int16 }));
    }

    #[test]
    fn schema_accepts_mapping_form() {
        let doc = parse_document("Schema:\n  $lives: { addr: 70 }\n").expect("parse");
        assert_eq!(doc.schema.get("lives"), Some(&SchemaVar { addr: 70, ty: VarType::Int8 }));
    }

    #[test]
    fn object_valued_keys_become_components() {
        let doc = parse_document(
            "Entity.Hero:\n  Visual: hero\n  Kinematic: {}\n  Gravity: { force: 2 }\n  Label: ignored\n",
        )
        .expect("parse");
        let hero = doc.entities.get("Hero").expect("hero");
        assert_eq!(hero.visual.as_deref(), Some("hero"));
        assert_eq!(hero.components.keys().collect::<Vec<_>>(), vec!["Kinematic", "Gravity"]);
        assert_eq!(hero.components.get("Gravity").and_then(|p| p.get("force")), Some(&Value::from(2)));
    }

    #[test]
    fn states_require_conditions() {
        let err = parse_document("Entity.Hero:\n  States:\n    idle:\n      Visual: a\n").unwrap_err();
        assert!(err.message.contains("missing a condition"), "got {err}");

        let doc = parse_document(
            "Entity.Hero:\n  States:\n    running:\n      condition: \"$vx > 2\"\n      Visual: run\n      Animator: { speed: 4 }\n",
        )
        .expect("parse");
        let running = doc.entities.get("Hero").and_then(|h| h.states.get("running")).expect("state");
        assert_eq!(running.condition, "$vx > 2");
        assert_eq!(running.visual.as_deref(), Some("run"));
        assert!(running.components.contains_key("Animator"));
    }

    #[test]
    fn sprites_support_grid_and_absolute_forms() {
        let doc = parse_document(
            "Sprites:\n  $Grid: 8\n  idle: [0, 0]\n  run: [1, 0, 3]\n  boss: { x: 32, y: 0, w: 16, h: 24, oy: 4 }\n",
        )
        .expect("parse");
        assert_eq!(doc.sprite_grid, Some(8));
        assert_eq!(doc.sprites.keys().collect::<Vec<_>>(), vec!["idle", "run", "boss"]);
        assert_eq!(doc.sprites.get("run"), Some(&SpriteDef::Grid { col: 1, row: 0, frames: 3 }));
        assert_eq!(
            doc.sprites.get("boss"),
            Some(&SpriteDef::Absolute { x: 32, y: 0, w: 16, h: 24, ox: 0, oy: 4 })
        );
        assert!(parse_document("Sprites:\n  bad: [1]\n").is_err());
    }

    #[test]
    fn sprite_frames_fit_in_a_sprite_id() {
        assert!(parse_document("Sprites:\n  long: [0, 0, 255]\n").is_ok());
        let err = parse_document("Sprites:\n  huge: [0, 0, 4000000000]\n").unwrap_err();
        assert!(err.message.contains("at most 255"), "got {err}");
    }

    #[test]
    fn layers_and_backgrounds_keep_order_and_defaults() {
        let doc = parse_document(
            "\
Backgrounds:
  - { source: sky.png, parallaxX: 0.2 }
  - source: hills.png
    repeat: true
Layers:
  - { Parallax: { source: sky.png, parallaxY: 0.5 } }
  - Entities
  - { Entities: {} }
  - Terrain: { source: level.png }
  - UI:
      source: hud.png
",
        )
        .expect("parse");
        assert_eq!(doc.backgrounds.len(), 2);
        assert_eq!(doc.backgrounds[0].parallax_x, 0.2);
        assert_eq!(doc.backgrounds[0].parallax_y, 1.0);
        assert!(doc.backgrounds[1].repeat);
        assert_eq!(
            doc.layers,
            vec![
                LayerDef::Parallax { source: "sky.png".into(), repeat: false, parallax_x: 1.0, parallax_y: 0.5 },
                LayerDef::Entities,
                LayerDef::Entities,
                LayerDef::Terrain { source: "level.png".into(), repeat: false },
                LayerDef::Ui { source: "hud.png".into() },
            ]
        );
    }

    #[test]
    fn events_accept_both_forms() {
        let doc = parse_document(
            "\
Events:
  - trigger: OnFrame
    actions:
      - State.$ticks += 1
  - Input(Action.Jump): State.$jumps += 1
  - \"Collision(Player:#FFFF00, Lava:#FF0000)\": [State.$hp = 0, State.$dead = 1]
",
        )
        .expect("parse");
        assert_eq!(doc.events.len(), 3);
        assert_eq!(doc.events[0].trigger, "OnFrame");
        assert_eq!(doc.events[1].trigger, "Input(Action.Jump)");
        assert_eq!(doc.events[1].actions, vec!["State.$jumps += 1"]);
        assert_eq!(doc.events[2].actions.len(), 2);
    }

    #[test]
    fn instances_and_global_input() {
        let doc = parse_document(
            "Input:\n  ArrowLeft: Action.Left\nInstances:\n  - { entity: Hero, x: 10, y: 20 }\n  - entity: Coin\n    x: 5\n",
        )
        .expect("parse");
        assert_eq!(doc.inputs.get("ArrowLeft").map(String::as_str), Some("Action.Left"));
        assert_eq!(doc.instances[0], InstanceDef { entity: "Hero".into(), x: 10, y: 20 });
        assert_eq!(doc.instances[1], InstanceDef { entity: "Coin".into(), x: 5, y: 0 });
    }
}
