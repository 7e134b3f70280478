//! Indentation reader for MSC source text.
//!
//! Produces an untyped [`Node`] tree. Mappings keep declaration order and duplicate keys (so
//! repeatable statements such as `Import:` survive); interpretation happens in `parser`.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Node::Number(value) => Some(*value),
            Node::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            Node::Number(value) => Some(*value != 0.0),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// First value stored under `key` in a mapping.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar rendered as text; numbers and booleans are formatted.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Node::Text(text) => Some(text.clone()),
            Node::Number(value) => Some(format_number(*value)),
            Node::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Number(_) => "number",
            Node::Text(_) => "text",
            Node::List(_) => "list",
            Node::Map(_) => "object",
        }
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub fn at(line: usize, message: impl Into<String>) -> Self {
        Self { line: Some(line), message: message.into() }
    }

    pub fn new(message: impl Into<String>) -> Self {
        Self { line: None, message: message.into() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
struct Line {
    number: usize,
    indent: usize,
    text: String,
}

/// Net bracket depth of `text`, ignoring brackets inside quotes.
fn bracket_balance(text: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn logical_lines(source: &str) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut pending: Option<(Line, i32)> = None;
    for (idx, raw) in source.lines().enumerate() {
        let raw = raw.trim_end_matches('\r');
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        if let Some((mut line, depth)) = pending.take() {
            line.text.push(' ');
            line.text.push_str(trimmed);
            let depth = depth + bracket_balance(trimmed);
            if depth > 0 {
                pending = Some((line, depth));
            } else {
                lines.push(line);
            }
            continue;
        }
        let indent = raw
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 2 } else { 1 })
            .sum();
        let line = Line { number: idx + 1, indent, text: trimmed.to_string() };
        let depth = bracket_balance(trimmed);
        if depth > 0 {
            pending = Some((line, depth));
        } else {
            lines.push(line);
        }
    }
    if let Some((line, _)) = pending {
        lines.push(line);
    }
    lines
}

/// Splits `key: value` at the first colon outside quotes and brackets that is followed by
/// whitespace or the end of the line.
pub fn split_key(text: &str) -> Option<(String, &str)> {
    let bytes: Vec<(usize, char)> = text.char_indices().collect();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (pos, &(idx, c)) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            ':' if depth == 0 => {
                let followed_by_space = bytes.get(pos + 1).map_or(true, |(_, next)| next.is_whitespace());
                if !followed_by_space {
                    continue;
                }
                let key = unquote(text[..idx].trim());
                if key.is_empty() {
                    return None;
                }
                return Some((key, text[idx + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if raw.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[raw.len() - 1] == bytes[0] {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

fn is_list_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn starts_flow_value(text: &str) -> bool {
    matches!(text.chars().next(), Some('{' | '['))
}

struct BlockReader {
    lines: Vec<Line>,
    pos: usize,
}

impl BlockReader {
    fn peek_indent(&self) -> Option<usize> {
        self.lines.get(self.pos).map(|line| line.indent)
    }

    fn block(&mut self, indent: usize) -> Result<Node, ParseError> {
        let line = &self.lines[self.pos];
        if is_list_item(&line.text) {
            self.list(indent)
        } else {
            self.map(indent, Vec::new())
        }
    }

    /// Nested block for a key whose value continues on the following, deeper-indented lines.
    fn nested(&mut self, parent_indent: usize) -> Result<Node, ParseError> {
        match self.peek_indent() {
            Some(indent) if indent > parent_indent => self.block(indent),
            _ => Ok(Node::Null),
        }
    }

    fn map(&mut self, indent: usize, mut entries: Vec<(String, Node)>) -> Result<Node, ParseError> {
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent != indent {
                break;
            }
            let number = line.number;
            if is_list_item(&line.text) {
                return Err(ParseError::at(number, "list item inside a mapping"));
            }
            let Some((key, rest)) = split_key(&line.text) else {
                return Err(ParseError::at(number, format!("expected `key: value`, found `{}`", line.text)));
            };
            let rest = rest.to_string();
            self.pos += 1;
            let value = if rest.is_empty() { self.nested(indent)? } else { parse_inline(&rest, number)? };
            entries.push((key, value));
        }
        self.check_dedent(indent)?;
        Ok(Node::Map(entries))
    }

    fn list(&mut self, indent: usize) -> Result<Node, ParseError> {
        let mut items = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent != indent {
                break;
            }
            let number = line.number;
            if !is_list_item(&line.text) {
                return Err(ParseError::at(number, "mapping entry inside a list"));
            }
            let rest = line.text[1..].trim_start().to_string();
            let item_indent = indent + (line.text.len() - rest.len());
            self.pos += 1;
            let item = if rest.is_empty() {
                self.nested(indent)?
            } else if let Some((key, value)) = split_key(&rest).filter(|_| !starts_flow_value(&rest)) {
                let value = if value.is_empty() {
                    self.nested(item_indent)?
                } else {
                    parse_inline(value, number)?
                };
                let first = vec![(key, value)];
                match self.peek_indent() {
                    Some(next) if next > indent => self.map(next, first)?,
                    _ => Node::Map(first),
                }
            } else {
                parse_inline(&rest, number)?
            };
            items.push(item);
        }
        self.check_dedent(indent)?;
        Ok(Node::List(items))
    }

    fn check_dedent(&self, indent: usize) -> Result<(), ParseError> {
        match self.lines.get(self.pos) {
            Some(line) if line.indent > indent => Err(ParseError::at(line.number, "inconsistent indentation")),
            _ => Ok(()),
        }
    }
}

/// Reads a whole MSC source into a node tree. An empty source yields an empty mapping.
pub fn read(source: &str) -> Result<Node, ParseError> {
    let lines = logical_lines(source);
    let Some(first) = lines.first() else {
        return Ok(Node::Map(Vec::new()));
    };
    let indent = first.indent;
    let mut reader = BlockReader { lines, pos: 0 };
    let root = reader.block(indent)?;
    if let Some(line) = reader.lines.get(reader.pos) {
        return Err(ParseError::at(line.number, "unexpected dedent below the top level"));
    }
    Ok(root)
}

/// Parses an inline value: a flow mapping/list, a quoted string, or a bare scalar.
pub fn parse_inline(text: &str, line: usize) -> Result<Node, ParseError> {
    let mut flow = Flow { chars: text.chars().collect(), pos: 0, line };
    flow.skip_ws();
    let node = match flow.peek() {
        Some('{' | '[' | '"' | '\'') => {
            let node = flow.value(&[])?;
            flow.skip_ws();
            if flow.pos < flow.chars.len() {
                return Err(ParseError::at(line, format!("unexpected trailing text after value: `{text}`")));
            }
            node
        }
        _ => scalar(text.trim()),
    };
    Ok(node)
}

fn scalar(raw: &str) -> Node {
    match raw {
        "" | "null" | "~" => Node::Null,
        "true" => Node::Bool(true),
        "false" => Node::Bool(false),
        _ => {
            let numeric_start = raw
                .trim_start_matches(|c| c == '-' || c == '+')
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '.');
            match raw.parse::<f64>() {
                Ok(value) if numeric_start && value.is_finite() => Node::Number(value),
                _ => Node::Text(raw.to_string()),
            }
        }
    }
}

struct Flow {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Flow {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::at(self.line, message)
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn value(&mut self, terminators: &[char]) -> Result<Node, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.mapping(),
            Some('[') => self.list(),
            Some(q @ ('"' | '\'')) => Ok(Node::Text(self.quoted(q)?)),
            Some(_) => Ok(scalar(&self.bare(terminators))),
            None => Err(self.error("unterminated value")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, ParseError> {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    let escaped = self.peek().ok_or_else(|| self.error("unterminated string"))?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    /// Bare scalar up to a terminator at bracket depth 0.
    fn bare(&mut self, terminators: &[char]) -> String {
        let start = self.pos;
        let mut depth = 0i32;
        while let Some(c) = self.peek() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                c if depth <= 0 && terminators.contains(&c) => break,
                _ => {}
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect::<String>().trim().to_string()
    }

    fn mapping(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Node::Map(entries));
                }
                None => return Err(self.error("unterminated '{'")),
                _ => {}
            }
            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.quoted(q)?,
                _ => self.bare(&[':', ',', '}']),
            };
            if key.is_empty() {
                return Err(self.error("empty key in inline object"));
            }
            self.expect(':')?;
            self.skip_ws();
            let value = match self.peek() {
                Some(',' | '}') => Node::Null,
                _ => self.value(&[',', '}'])?,
            };
            entries.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}' in inline object")),
            }
        }
    }

    fn list(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(Node::List(items));
                }
                None => return Err(self.error("unterminated '['")),
                _ => {}
            }
            items.push(self.value(&[',', ']'])?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err(self.error("expected ',' or ']' in inline list")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Node {
        Node::Text(value.to_string())
    }

    #[test]
    fn reads_nested_mappings_and_lists() {
        let source = "\
# header comment
Source: level.png
Entity.Hero:
  Visual: hero_idle
  Gravity: { force: 2 }
  States:
    jumping:
      condition: \"$vy < 0\"
Instances:
  - { entity: Hero, x: 4, y: 8 }
  - entity: Hero
    x: 12
";
        let root = read(source).expect("read");
        assert_eq!(root.get("Source"), Some(&text("level.png")));
        let hero = root.get("Entity.Hero").expect("entity");
        assert_eq!(hero.get("Gravity").and_then(|g| g.get("force")), Some(&Node::Number(2.0)));
        let jumping = hero.get("States").and_then(|s| s.get("jumping")).expect("state");
        assert_eq!(jumping.get("condition"), Some(&text("$vy < 0")));
        let instances = root.get("Instances").and_then(Node::as_list).expect("instances");
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].get("x"), Some(&Node::Number(12.0)));
    }

    #[test]
    fn keeps_duplicate_keys_in_order() {
        let root = read("Import: a.msc\nImport: b.msc\n").expect("read");
        let imports: Vec<_> = root.as_map().expect("map").iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(imports, vec![text("a.msc"), text("b.msc")]);
    }

    #[test]
    fn colons_inside_parentheses_do_not_split_keys() {
        let (key, value) = split_key("Collision(Player:#FF0, Wall:#000): State.$hits += 1").expect("split");
        assert_eq!(key, "Collision(Player:#FF0, Wall:#000)");
        assert_eq!(value, "State.$hits += 1");
        assert!(split_key("http://example").is_none(), "colon must be followed by whitespace");
    }

    #[test]
    fn flow_values_may_span_lines() {
        let root = read("Camera: {\n  followSpeed: 0.5,\n  tint: \"#fff\"\n}\n").expect("read");
        let camera = root.get("Camera").expect("camera");
        assert_eq!(camera.get("followSpeed"), Some(&Node::Number(0.5)));
        assert_eq!(camera.get("tint"), Some(&text("#fff")));
    }

    #[test]
    fn inline_scalars_are_typed() {
        assert_eq!(parse_inline("42", 1).expect("num"), Node::Number(42.0));
        assert_eq!(parse_inline("-1.5", 1).expect("num"), Node::Number(-1.5));
        assert_eq!(parse_inline("true", 1).expect("bool"), Node::Bool(true));
        assert_eq!(parse_inline("\"12\"", 1).expect("quoted"), text("12"));
        assert_eq!(parse_inline("Action.Jump", 1).expect("bare"), text("Action.Jump"));
        assert_eq!(parse_inline("{}", 1).expect("empty"), Node::Map(Vec::new()));
        assert_eq!(
            parse_inline("[1, 0, 3]", 1).expect("list"),
            Node::List(vec![Node::Number(1.0), Node::Number(0.0), Node::Number(3.0)])
        );
    }

    #[test]
    fn list_items_with_nested_first_key() {
        let source = "\
Layers:
  - Entities
  - Parallax:
      source: sky.png
      parallaxX: 0.25
";
        let root = read(source).expect("read");
        let layers = root.get("Layers").and_then(Node::as_list).expect("layers");
        assert_eq!(layers[0], text("Entities"));
        let parallax = layers[1].get("Parallax").expect("parallax");
        assert_eq!(parallax.get("parallaxX"), Some(&Node::Number(0.25)));
    }

    #[test]
    fn reports_bad_indentation_with_line_numbers() {
        let err = read("Entity.Hero:\n    Visual: a\n  Gravity: {}\n").unwrap_err();
        assert_eq!(err.line, Some(3));
        let err = read("Schema:\n  - { name: a }\n  addr: 3\n").unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn reports_unterminated_flow_values() {
        assert!(read("Gravity: { force: 1\n").is_err());
        assert!(parse_inline("\"open", 1).is_err());
    }
}
