pub mod assets;
pub mod buffer;
pub mod camera;
#[cfg(feature = "cartridge")]
pub mod cartridge;
pub mod cli;
pub mod components;
pub mod config;
pub mod engine;
pub mod entity;
pub mod expr;
pub mod harness;
pub mod imports;
pub mod input;
pub mod msc;
pub mod runner;
pub mod sprites;
pub mod state;
pub mod triggers;

pub use engine::{logic, ComponentFault, Engine, TickReport};
pub use msc::{parse_document, Document};
pub use state::EngineState;
