//! Component registry: id → tick function, optional condition context and scratch byte demand.

mod builtins;

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

use crate::assets::BakedAssets;
use crate::buffer::{BufferResult, StateBuffer};
use crate::entity::ScratchRange;
use crate::input::InputSnapshot;
use crate::msc::{Document, Props};
use crate::state::EngineState;

pub use builtins::{register_builtins, BUILTIN_IDS};

/// `$name` → value pairs a component exposes to state conditions.
pub type ContextValues = BTreeMap<String, f64>;

pub type TickFn = Box<dyn Fn(&mut EngineState, usize, &Props, &TickEnv<'_>) -> Result<()>>;
pub type ContextFn = Box<dyn Fn(&StateBuffer, usize, &Props, ScratchRange) -> BufferResult<ContextValues>>;

/// Read-only inputs of a single component tick.
#[derive(Clone, Copy)]
pub struct TickEnv<'a> {
    pub input: &'a InputSnapshot,
    pub assets: &'a BakedAssets,
    pub document: &'a Document,
    pub scratch: ScratchRange,
}

impl<'a> TickEnv<'a> {
    pub fn new(input: &'a InputSnapshot, assets: &'a BakedAssets, document: &'a Document) -> Self {
        Self { input, assets, document, scratch: ScratchRange::EMPTY }
    }

    pub fn with_scratch(mut self, scratch: ScratchRange) -> Self {
        self.scratch = scratch;
        self
    }

    /// Type id named by a `target` prop, `None` when absent. Unknown names match no entity.
    pub fn target_type(&self, props: &Props) -> Option<Option<u8>> {
        props.text("target").map(|name| self.document.type_id(name))
    }
}

pub struct RegisteredComponent {
    pub tick: TickFn,
    pub context: Option<ContextFn>,
    pub scratch_bytes: usize,
}

impl RegisteredComponent {
    pub fn new<F>(tick: F) -> Self
    where
        F: Fn(&mut EngineState, usize, &Props, &TickEnv<'_>) -> Result<()> + 'static,
    {
        Self { tick: Box::new(tick), context: None, scratch_bytes: 0 }
    }

    pub fn with_context<F>(mut self, context: F) -> Self
    where
        F: Fn(&StateBuffer, usize, &Props, ScratchRange) -> BufferResult<ContextValues> + 'static,
    {
        self.context = Some(Box::new(context));
        self
    }

    pub fn with_scratch(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }
}

impl std::fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("context", &self.context.is_some())
            .field("scratch_bytes", &self.scratch_bytes)
            .finish()
    }
}

#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, RegisteredComponent>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in component library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Registers `component` under `id`, returning any component it replaced.
    pub fn register(&mut self, id: impl Into<String>, component: RegisteredComponent) -> Option<RegisteredComponent> {
        self.components.insert(id.into(), component)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredComponent> {
        self.components.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    pub fn unregister(&mut self, id: &str) -> Option<RegisteredComponent> {
        self.components.remove(id)
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.components.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Typed lookups on a component's property bag.
pub trait PropsExt {
    fn number(&self, key: &str, default: f64) -> f64;
    fn text(&self, key: &str) -> Option<&str>;
    fn flag(&self, key: &str, default: bool) -> bool;
}

impl PropsExt for Props {
    fn number(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
            Some(serde_json::Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => default,
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(serde_json::Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => default,
        }
    }
}
