use anyhow::{anyhow, Result};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::assets::BakedAssets;
use crate::components::{ComponentRegistry, ContextValues, PropsExt, TickEnv};
use crate::entity::{slot_ptrs, ScratchRange, SCRATCH_LEN};
use crate::expr::{parse_expr, Expr};
use crate::input::{InputBindings, InputSnapshot};
use crate::msc::{Document, EntityDef, Props};
use crate::sprites::SpriteAtlas;
use crate::state::EngineState;
use crate::triggers::{parse_action, parse_trigger, read_global, Assignment, Trigger};

/// A component tick that returned an error. The entity's remaining components still ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentFault {
    pub slot: usize,
    pub entity: String,
    pub component: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub fired_events: usize,
    pub ticked_entities: usize,
    pub faults: Vec<ComponentFault>,
    pub warnings: Vec<String>,
}

struct CompiledEvent {
    trigger: Trigger,
    actions: Vec<Assignment>,
}

struct EntityType {
    name: String,
    /// One entry per declared state; `None` when the condition failed to compile.
    conditions: Vec<Option<Expr>>,
    scratch: HashMap<String, ScratchRange>,
    own_bindings: InputBindings,
    bindings: InputBindings,
}

/// Compiled, immutable view of a document plus the component registry that runs it.
pub struct Engine {
    document: Arc<Document>,
    registry: ComponentRegistry,
    atlas: SpriteAtlas,
    events: Vec<CompiledEvent>,
    types: Vec<EntityType>,
    global_bindings: InputBindings,
    diagnostics: Vec<String>,
    logged_faults: HashSet<(String, String, String)>,
}

type ResolvedComponents<'a> = SmallVec<[(&'a str, &'a Props); 8]>;

impl Engine {
    pub fn new(document: Arc<Document>, registry: ComponentRegistry) -> Self {
        let mut diagnostics = Vec::new();
        let events = compile_events(&document, &mut diagnostics);
        let global_bindings = InputBindings::from_key_map(&document.inputs);

        if document.entities.len() > u8::MAX as usize {
            diagnostics.push(format!(
                "{} entity definitions declared; only the first {} get a type id",
                document.entities.len(),
                u8::MAX
            ));
        }
        let types = document
            .entities
            .iter()
            .take(u8::MAX as usize)
            .map(|(name, def)| compile_entity(name, def, &registry, &global_bindings, &mut diagnostics))
            .collect();

        let atlas = SpriteAtlas::build(&document);
        for diagnostic in &diagnostics {
            eprintln!("[engine] {diagnostic}");
        }
        Self {
            document,
            registry,
            atlas,
            events,
            types,
            global_bindings,
            diagnostics,
            logged_faults: HashSet::new(),
        }
    }

    /// Layers host key bindings under the document's own `Input:` blocks.
    pub fn with_bindings(mut self, host: &InputBindings) -> Self {
        self.global_bindings = InputBindings::from_key_map(&self.document.inputs).merged_with(host);
        for ty in &mut self.types {
            ty.bindings = ty.own_bindings.merged_with(&self.global_bindings);
        }
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn atlas(&self) -> &SpriteAtlas {
        &self.atlas
    }

    /// Problems found while compiling the document: bad triggers, actions, conditions, scratch overflow.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Scratch range assigned to `component` on entity type `entity`.
    pub fn scratch_range(&self, entity: &str, component: &str) -> Option<ScratchRange> {
        let ty = self.types.iter().find(|ty| ty.name == entity)?;
        ty.scratch.get(component).copied()
    }

    /// Spawns `entity` into the first free slot. `Ok(None)` when the pool is full.
    pub fn spawn(&self, state: &mut EngineState, entity: &str, x: i64, y: i64) -> Result<Option<usize>> {
        let type_id = self.document.type_id(entity).ok_or_else(|| anyhow!("unknown entity '{entity}'"))?;
        let health = self.document.entity_by_type(type_id).map_or(100, |(_, def)| def.initial_health());
        Ok(state.buffer.spawn_entity(type_id, x, y, health)?)
    }

    /// Spawns every `Instances:` entry. Returns how many were placed.
    pub fn spawn_instances(&self, state: &mut EngineState) -> Result<usize> {
        let mut spawned = 0;
        for instance in &self.document.instances {
            match self.spawn(state, &instance.entity, instance.x, instance.y) {
                Ok(Some(_)) => spawned += 1,
                Ok(None) => {
                    eprintln!("[engine] entity pool is full; skipping remaining instances");
                    break;
                }
                Err(err) => eprintln!("[engine] instance skipped: {err}"),
            }
        }
        Ok(spawned)
    }

    /// Advances one frame: global events, then the entity pass, then the tick counter.
    pub fn tick(&mut self, state: &mut EngineState, input: &InputSnapshot, assets: &BakedAssets) -> TickReport {
        let mut report = TickReport::default();
        self.run_events(state, input, &mut report);
        self.run_entities(state, input, assets, &mut report);
        state.tick_count += 1;

        for fault in &report.faults {
            let key = (fault.entity.clone(), fault.component.clone(), fault.message.clone());
            if self.logged_faults.insert(key) {
                eprintln!(
                    "[engine] {}.{} failed at slot {}: {}",
                    fault.entity, fault.component, fault.slot, fault.message
                );
            }
        }
        report
    }

    fn run_events(&self, state: &mut EngineState, input: &InputSnapshot, report: &mut TickReport) {
        let input = self.global_bindings.apply(input);
        let schema = &self.document.schema;
        for event in &self.events {
            if !event.trigger.fires(&state.buffer, state.width, &input, schema) {
                continue;
            }
            report.fired_events += 1;
            for action in &event.actions {
                if let Err(err) = action.apply(&mut state.buffer, schema) {
                    report.warnings.push(format!("action on ${} failed: {err}", action.var));
                }
            }
        }
    }

    fn run_entities(
        &self,
        state: &mut EngineState,
        input: &InputSnapshot,
        assets: &BakedAssets,
        report: &mut TickReport,
    ) {
        let document: &Document = &self.document;
        let inputs: Vec<InputSnapshot> = self.types.iter().map(|ty| ty.bindings.apply(input)).collect();

        for ptr in slot_ptrs(state.buffer.len()) {
            if !state.buffer.is_active(ptr).unwrap_or(false) {
                continue;
            }
            let Ok(type_id) = state.buffer.type_id(ptr) else {
                continue;
            };
            let Some(index) = (type_id as usize).checked_sub(1) else {
                continue;
            };
            let (Some(ty), Some((_, def))) = (self.types.get(index), document.entities.get_index(index)) else {
                continue;
            };

            let state_index = self.resolve_state(state, ptr, ty, def);
            let overrides = state_index.and_then(|i| def.states.get_index(i)).map(|(_, s)| s);
            let components = merge_components(def, overrides.map(|s| &s.components));
            let visual = overrides.and_then(|s| s.visual.as_deref()).or(def.visual.as_deref());

            let env = TickEnv::new(&inputs[index], assets, document);
            for &(id, props) in &components {
                let Some(component) = self.registry.get(id) else {
                    continue;
                };
                let scratch = ty.scratch.get(id).copied().unwrap_or(ScratchRange::EMPTY);
                if let Err(err) = (component.tick)(state, ptr, props, &env.with_scratch(scratch)) {
                    report.faults.push(ComponentFault {
                        slot: ptr,
                        entity: ty.name.clone(),
                        component: id.to_string(),
                        message: format!("{err:#}"),
                    });
                }
            }

            let speed = components
                .iter()
                .find(|(id, _)| *id == "Animator")
                .map_or(1.0, |(_, props)| props.number("speed", 1.0));
            let sprite = visual
                .and_then(|name| self.atlas.range(name))
                .map_or(0, |range| range.frame_at(state.tick_count, speed));
            if let Err(err) = state.buffer.set_sprite_id(ptr, sprite) {
                report.warnings.push(format!("sprite sync failed at slot {ptr}: {err}"));
            }
            report.ticked_entities += 1;
        }
    }

    /// First state, in declaration order, whose condition holds. Conditions see the context of
    /// every component the type can attach, including ones only a state adds, so a state can be
    /// left through values its own components write.
    fn resolve_state(&self, state: &EngineState, ptr: usize, ty: &EntityType, def: &EntityDef) -> Option<usize> {
        if ty.conditions.iter().all(Option::is_none) {
            return None;
        }
        let mut context = ContextValues::new();
        for (id, props) in attachable_components(def) {
            let Some(accessor) = self.registry.get(id).and_then(|c| c.context.as_ref()) else {
                continue;
            };
            let scratch = ty.scratch.get(id).copied().unwrap_or(ScratchRange::EMPTY);
            if let Ok(values) = accessor(&state.buffer, ptr, props, scratch) {
                for (name, value) in values {
                    context.entry(name).or_insert(value);
                }
            }
        }
        let schema = &self.document.schema;
        let lookup = |name: &str| match context.get(&format!("${name}")) {
            Some(value) => *value,
            None => read_global(&state.buffer, schema, name),
        };
        ty.conditions.iter().position(|condition| condition.as_ref().is_some_and(|expr| expr.is_true(&lookup)))
    }
}

/// Base components with the active state's bag laid over them: same ids are replaced in place,
/// new ids are appended.
fn merge_components<'a>(
    def: &'a EntityDef,
    overrides: Option<&'a crate::msc::OrderedMap<Props>>,
) -> ResolvedComponents<'a> {
    let mut merged: ResolvedComponents<'a> = def.components.iter().collect();
    for (id, props) in overrides.into_iter().flat_map(|bag| bag.iter()) {
        match merged.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = props,
            None => merged.push((id, props)),
        }
    }
    merged
}

/// Base components first, then each id a state introduces with the props of the first state that
/// declares it.
fn attachable_components(def: &EntityDef) -> ResolvedComponents<'_> {
    let mut all: ResolvedComponents<'_> = def.components.iter().collect();
    for (id, props) in def.states.values().flat_map(|body| body.components.iter()) {
        if !all.iter().any(|(existing, _)| *existing == id) {
            all.push((id, props));
        }
    }
    all
}

fn compile_events(document: &Document, diagnostics: &mut Vec<String>) -> Vec<CompiledEvent> {
    let mut events = Vec::with_capacity(document.events.len());
    for event in &document.events {
        let trigger = match parse_trigger(&event.trigger) {
            Ok(trigger) => trigger,
            Err(err) => {
                diagnostics.push(format!("event '{}' never fires: {err}", event.trigger));
                continue;
            }
        };
        let mut actions = Vec::with_capacity(event.actions.len());
        for raw in &event.actions {
            match parse_action(raw) {
                Ok(action) => actions.push(action),
                Err(err) => diagnostics.push(format!("event '{}': {err}", event.trigger)),
            }
        }
        events.push(CompiledEvent { trigger, actions });
    }
    events
}

fn compile_entity(
    name: &str,
    def: &EntityDef,
    registry: &ComponentRegistry,
    global_bindings: &InputBindings,
    diagnostics: &mut Vec<String>,
) -> EntityType {
    let conditions = def
        .states
        .iter()
        .map(|(state, body)| match parse_expr(&body.condition) {
            Ok(expr) => Some(expr),
            Err(err) => {
                diagnostics.push(format!("Entity.{name} state '{state}' never matches: {err}"));
                None
            }
        })
        .collect();

    let mut scratch = HashMap::new();
    let mut next = 0;
    for id in def.all_component_ids() {
        let Some(component) = registry.get(id) else {
            diagnostics.push(format!("Entity.{name}: unknown component '{id}' is ignored"));
            continue;
        };
        let bytes = component.scratch_bytes;
        if bytes == 0 {
            continue;
        }
        if next + bytes <= SCRATCH_LEN {
            scratch.insert(id.to_string(), ScratchRange::new(next, bytes));
            next += bytes;
        } else {
            diagnostics.push(format!(
                "Entity.{name}: component '{id}' needs {bytes} scratch bytes but only {} remain",
                SCRATCH_LEN - next
            ));
            scratch.insert(id.to_string(), ScratchRange::EMPTY);
        }
    }

    let own_bindings = InputBindings::from_key_map(&def.inputs);
    let bindings = own_bindings.merged_with(global_bindings);
    EntityType { name: name.to_string(), conditions, scratch, own_bindings, bindings }
}

/// One-shot tick with the built-in registry. Hosts that tick every frame should keep an [`Engine`].
pub fn logic(state: &mut EngineState, input: &InputSnapshot, assets: &BakedAssets, document: &Document) -> TickReport {
    let mut engine = Engine::new(Arc::new(document.clone()), ComponentRegistry::with_builtins());
    engine.tick(state, input, assets)
}
