//! Global event triggers and `State.$var` actions.

use anyhow::{anyhow, bail, Result};

use crate::buffer::{layout, BufferResult, StateBuffer};
use crate::camera::parse_hex_rgb;
use crate::expr::{parse_expr, variable_name, Expr};
use crate::input::{normalize_action, InputSnapshot};
use crate::msc::{OrderedMap, SchemaVar};

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    OnFrame,
    Input(String),
    Collision { first: [u8; 3], second: [u8; 3] },
    State(Expr),
}

fn call_args<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.strip_prefix(name)?.trim_start().strip_prefix('(')?.strip_suffix(')')
}

/// Parses one side of a collision trigger, `Label:#RRGGBB` or just `#RRGGBB`.
fn collision_color(raw: &str) -> Result<[u8; 3]> {
    let hex = raw.rsplit_once(':').map_or(raw, |(_, hex)| hex).trim();
    parse_hex_rgb(hex).ok_or_else(|| anyhow!("invalid collision color '{}'", raw.trim()))
}

pub fn parse_trigger(raw: &str) -> Result<Trigger> {
    let raw = raw.trim();
    if raw == "OnFrame" {
        return Ok(Trigger::OnFrame);
    }
    if let Some(args) = call_args(raw, "Input") {
        let action = normalize_action(args);
        if action.is_empty() {
            bail!("Input trigger needs an action");
        }
        return Ok(Trigger::Input(action.to_string()));
    }
    if let Some(args) = call_args(raw, "Collision") {
        let Some((first, second)) = args.split_once(',') else {
            bail!("Collision trigger needs two colors");
        };
        return Ok(Trigger::Collision { first: collision_color(first)?, second: collision_color(second)? });
    }
    if let Some(args) = call_args(raw, "State") {
        let expr = parse_expr(args).map_err(|err| anyhow!("invalid State condition: {err}"))?;
        return Ok(Trigger::State(expr));
    }
    bail!("unknown trigger '{raw}'")
}

/// Value of a schema variable, 0 when unknown or unreadable.
pub fn read_global(buffer: &StateBuffer, schema: &OrderedMap<SchemaVar>, name: &str) -> f64 {
    schema.get(name).and_then(|var| buffer.read_var(var.ty, var.addr).ok()).unwrap_or(0.0)
}

impl Trigger {
    pub fn fires(&self, buffer: &StateBuffer, width: u32, input: &InputSnapshot, schema: &OrderedMap<SchemaVar>) -> bool {
        match self {
            Trigger::OnFrame => true,
            Trigger::Input(action) => input.is_active(action),
            Trigger::Collision { first, second } => colors_adjacent(buffer.as_bytes(), width, *first, *second),
            Trigger::State(expr) => expr.is_true(&|name: &str| read_global(buffer, schema, name)),
        }
    }
}

/// True when some pixel of color `a` has a 4-connected neighbour of color `b`. Alpha is ignored.
pub fn colors_adjacent(bytes: &[u8], width: u32, a: [u8; 3], b: [u8; 3]) -> bool {
    let width = width as usize;
    if width == 0 {
        return false;
    }
    let pixels = bytes.len() / layout::BYTES_PER_PIXEL;
    let height = pixels / width;
    let rgb = |index: usize| {
        let start = index * layout::BYTES_PER_PIXEL;
        [bytes[start], bytes[start + 1], bytes[start + 2]]
    };
    for y in 0..height {
        for x in 0..width {
            if rgb(y * width + x) != a {
                continue;
            }
            let neighbours = [
                (x > 0).then(|| y * width + x - 1),
                (x + 1 < width).then(|| y * width + x + 1),
                (y > 0).then(|| (y - 1) * width + x),
                (y + 1 < height).then(|| (y + 1) * width + x),
            ];
            if neighbours.into_iter().flatten().any(|index| rgb(index) == b) {
                return true;
            }
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

/// `State.$var = expr`, `+= expr` or `-= expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub var: String,
    pub op: AssignOp,
    pub value: Expr,
}

pub fn parse_action(raw: &str) -> Result<Assignment> {
    let raw = raw.trim();
    let Some(eq) = raw.find('=') else {
        bail!("action '{raw}' has no assignment");
    };
    if raw[eq + 1..].starts_with('=') {
        bail!("action '{raw}' compares instead of assigning");
    }
    let (lhs, op) = match raw[..eq].chars().last() {
        Some('+') => (&raw[..eq - 1], AssignOp::Add),
        Some('-') => (&raw[..eq - 1], AssignOp::Sub),
        _ => (&raw[..eq], AssignOp::Set),
    };
    let var = variable_name(lhs).ok_or_else(|| anyhow!("action '{raw}' does not assign a variable"))?;
    let value = parse_expr(&raw[eq + 1..]).map_err(|err| anyhow!("action '{raw}': {err}"))?;
    Ok(Assignment { var: var.to_string(), op, value })
}

impl Assignment {
    /// Applies the assignment. Returns `Ok(false)` when the variable is not in the schema.
    pub fn apply(&self, buffer: &mut StateBuffer, schema: &OrderedMap<SchemaVar>) -> BufferResult<bool> {
        let Some(var) = schema.get(&self.var).copied() else {
            return Ok(false);
        };
        let reader: &StateBuffer = buffer;
        let value = self.value.eval(&|name: &str| read_global(reader, schema, name));
        let next = match self.op {
            AssignOp::Set => value,
            AssignOp::Add => buffer.read_var(var.ty, var.addr)? + value,
            AssignOp::Sub => buffer.read_var(var.ty, var.addr)? - value,
        };
        buffer.write_var(var.ty, var.addr, next)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VarType;

    fn rgba(width: usize, height: usize) -> Vec<u8> {
        vec![0; width * height * 4]
    }

    fn paint(bytes: &mut [u8], width: usize, x: usize, y: usize, rgb: [u8; 3]) {
        let start = (y * width + x) * 4;
        bytes[start..start + 3].copy_from_slice(&rgb);
        bytes[start + 3] = 255;
    }

    #[test]
    fn parses_every_trigger_kind() {
        assert_eq!(parse_trigger("OnFrame").expect("frame"), Trigger::OnFrame);
        assert_eq!(parse_trigger("Input(Action.Jump)").expect("input"), Trigger::Input("Jump".into()));
        assert_eq!(
            parse_trigger("Collision(Player:#FF0, Lava:#ff0000)").expect("collision"),
            Trigger::Collision { first: [255, 255, 0], second: [255, 0, 0] }
        );
        assert!(matches!(parse_trigger("State($score >= 10)"), Ok(Trigger::State(_))));
        assert!(parse_trigger("OnTuesday").is_err());
        assert!(parse_trigger("Collision(#FFF)").is_err());
    }

    #[test]
    fn adjacency_is_four_connected_without_wrapping() {
        let (w, h) = (4, 3);
        let mut bytes = rgba(w, h);
        paint(&mut bytes, w, 3, 0, [255, 0, 0]);
        paint(&mut bytes, w, 0, 1, [0, 0, 255]);
        assert!(!colors_adjacent(&bytes, w as u32, [255, 0, 0], [0, 0, 255]), "row wrap is not adjacency");

        paint(&mut bytes, w, 1, 1, [0, 255, 0]);
        paint(&mut bytes, w, 2, 2, [255, 255, 255]);
        assert!(!colors_adjacent(&bytes, w as u32, [0, 255, 0], [255, 255, 255]), "diagonals do not count");
        assert!(colors_adjacent(&bytes, w as u32, [0, 255, 0], [0, 0, 255]));
    }

    #[test]
    fn actions_update_schema_variables() {
        let mut schema = OrderedMap::new();
        schema.insert("score", SchemaVar { addr: 64, ty: VarType::Int16 });
        let mut buffer = StateBuffer::default();

        assert!(parse_action("State.$score = 40").expect("set").apply(&mut buffer, &schema).expect("apply"));
        parse_action("State.$score += $score + 2").expect("add").apply(&mut buffer, &schema).expect("apply");
        parse_action("State.$score -= 2").expect("sub").apply(&mut buffer, &schema).expect("apply");
        assert_eq!(buffer.read_int16(64).expect("read"), 80);

        let unknown = parse_action("State.$missing = 3").expect("parse");
        assert!(!unknown.apply(&mut buffer, &schema).expect("apply"), "unknown variables are skipped");
        assert!(parse_action("State.$score == 3").is_err());
    }
}
