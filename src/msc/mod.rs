//! MSC script documents: the indentation reader, the document model and the parser that joins them.

pub mod model;
pub mod parser;
pub mod syntax;

pub use model::{
    BackgroundDef, Document, EntityDef, EventDef, InstanceDef, LayerDef, OrderedMap, Props, SchemaVar,
    SpriteDef, StateDef, DEFAULT_SPRITE_GRID,
};
pub use parser::parse_document;
pub use syntax::ParseError;
