use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::msc::{parse_document, Document};

pub const SCRIPT_EXTENSION: &str = "msc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Script,
    Image,
    Other,
}

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).unwrap_or_default();
        if ext.contains('/') {
            return FileKind::Other;
        }
        match ext.as_str() {
            SCRIPT_EXTENSION => FileKind::Script,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => FileKind::Image,
            _ => FileKind::Other,
        }
    }
}

/// A file in the project tree. `id` is the root-relative, `/`-separated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub id: String,
    pub name: String,
    pub kind: FileKind,
}

impl FileNode {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.rsplit('/').next().unwrap_or(&id).to_string();
        let kind = FileKind::from_path(&id);
        Self { id, name, kind }
    }
}

/// Project file access used while resolving `Import:` statements.
pub trait ProjectTree {
    /// Looks up `path` as written in the file identified by `current`.
    fn resolve_import_path(&self, current: &str, path: &str) -> Option<FileNode>;
    fn read_script(&self, node: &FileNode) -> Result<String>;
    fn file(&self, id: &str) -> Option<FileNode>;
}

/// Joins an import path onto the importing file's directory. Returns `None` when `..` escapes the root.
pub fn join_import_path(current: &str, path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    let path = path.trim();
    let relative = match path.strip_prefix('/') {
        Some(rest) => rest,
        None => {
            let dir = current.rsplit_once('/').map_or("", |(dir, _)| dir);
            parts.extend(dir.split('/').filter(|part| !part.is_empty() && *part != "."));
            path
        }
    };
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn candidates(joined: String) -> Vec<String> {
    let has_extension = joined.rsplit('/').next().is_some_and(|name| name.contains('.'));
    if has_extension {
        vec![joined]
    } else {
        let with_ext = format!("{joined}.{SCRIPT_EXTENSION}");
        vec![joined, with_ext]
    }
}

/// In-memory project, used by editors that keep files in memory and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    files: BTreeMap<String, String>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: &str, contents: &str) -> Self {
        self.insert(id, contents);
        self
    }

    pub fn insert(&mut self, id: &str, contents: &str) {
        let id = id.trim_start_matches('/').to_string();
        self.files.insert(id, contents.to_string());
    }

    pub fn contents(&self, id: &str) -> Option<&str> {
        self.files.get(id).map(String::as_str)
    }
}

impl ProjectTree for MemoryTree {
    fn resolve_import_path(&self, current: &str, path: &str) -> Option<FileNode> {
        let joined = join_import_path(current, path)?;
        candidates(joined).into_iter().find(|id| self.files.contains_key(id)).map(FileNode::new)
    }

    fn read_script(&self, node: &FileNode) -> Result<String> {
        self.files.get(&node.id).cloned().ok_or_else(|| anyhow!("file '{}' is not in the project", node.id))
    }

    fn file(&self, id: &str) -> Option<FileNode> {
        self.files.contains_key(id).then(|| FileNode::new(id))
    }
}

/// Project rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskTree {
    root: PathBuf,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, id: &str) -> PathBuf {
        id.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ProjectTree for DiskTree {
    fn resolve_import_path(&self, current: &str, path: &str) -> Option<FileNode> {
        let joined = join_import_path(current, path)?;
        candidates(joined).into_iter().find(|id| self.path_of(id).is_file()).map(FileNode::new)
    }

    fn read_script(&self, node: &FileNode) -> Result<String> {
        let path = self.path_of(&node.id);
        fs::read_to_string(&path).with_context(|| format!("reading script {}", path.display()))
    }

    fn file(&self, id: &str) -> Option<FileNode> {
        self.path_of(id).is_file().then(|| FileNode::new(id))
    }
}

/// The merged document plus every import problem met on the way.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDocument {
    pub document: Document,
    pub errors: Vec<String>,
}

impl ResolvedDocument {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walks `Import:` statements depth-first. The visited set spans the whole resolution, not just
/// the ancestor chain: a file reached twice through a diamond is merged once, and cycles terminate.
pub struct ImportResolver<'a, T: ProjectTree + ?Sized> {
    tree: &'a T,
    visited: HashSet<String>,
    errors: Vec<String>,
}

impl<'a, T: ProjectTree + ?Sized> ImportResolver<'a, T> {
    pub fn new(tree: &'a T) -> Self {
        Self { tree, visited: HashSet::new(), errors: Vec::new() }
    }

    pub fn resolve(mut self, text: &str, file_id: &str) -> ResolvedDocument {
        self.visited.insert(file_id.to_string());
        let name = self.tree.file(file_id).map_or_else(|| file_id.to_string(), |node| node.name);
        let document = self.resolve_text(text, file_id, &name);
        ResolvedDocument { document, errors: self.errors }
    }

    fn resolve_text(&mut self, text: &str, file_id: &str, name: &str) -> Document {
        let mut doc = match parse_document(text) {
            Ok(doc) => doc,
            Err(err) => {
                self.errors.push(format!("Parse error in {name}: {err}"));
                return Document::default();
            }
        };
        for import in doc.imports.clone() {
            let Some(node) = self.tree.resolve_import_path(file_id, &import) else {
                self.errors.push(format!("Import not found: \"{import}\""));
                continue;
            };
            if node.kind != FileKind::Script {
                self.errors.push(format!("{import} is not a script file"));
                continue;
            }
            if !self.visited.insert(node.id.clone()) {
                continue;
            }
            let text = match self.tree.read_script(&node) {
                Ok(text) => text,
                Err(err) => {
                    self.errors.push(format!("Failed to read {}: {err:#}", node.name));
                    continue;
                }
            };
            let imported = self.resolve_text(&text, &node.id, &node.name);
            doc.merge_import(imported);
        }
        doc
    }
}

pub fn resolve<T: ProjectTree + ?Sized>(tree: &T, text: &str, file_id: &str) -> ResolvedDocument {
    ImportResolver::new(tree).resolve(text, file_id)
}

/// Reads `path` from disk and resolves its imports relative to its directory.
pub fn resolve_file(path: &Path) -> Result<ResolvedDocument> {
    let text = fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_id = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("script path {} has no file name", path.display()))?;
    let tree = DiskTree::new(root);
    let resolved = resolve(&tree, &text, file_id);
    for err in &resolved.errors {
        eprintln!("[imports] {err}");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_and_rooted_paths() {
        assert_eq!(join_import_path("levels/one.msc", "common.msc").as_deref(), Some("levels/common.msc"));
        assert_eq!(join_import_path("levels/one.msc", "../lib/./hero.msc").as_deref(), Some("lib/hero.msc"));
        assert_eq!(join_import_path("levels/one.msc", "/shared.msc").as_deref(), Some("shared.msc"));
        assert_eq!(join_import_path("main.msc", "../outside.msc"), None);
    }

    #[test]
    fn extensionless_imports_try_the_script_extension() {
        let tree = MemoryTree::new().with_file("lib/hero.msc", "");
        let node = tree.resolve_import_path("main.msc", "lib/hero").expect("resolved");
        assert_eq!(node.id, "lib/hero.msc");
        assert_eq!(node.name, "hero.msc");
        assert_eq!(node.kind, FileKind::Script);
    }

    #[test]
    fn file_kinds_follow_extensions() {
        assert_eq!(FileKind::from_path("a/b.MSC"), FileKind::Script);
        assert_eq!(FileKind::from_path("tiles.png"), FileKind::Image);
        assert_eq!(FileKind::from_path("notes.txt"), FileKind::Other);
        assert_eq!(FileKind::from_path("dir.v2/readme"), FileKind::Other);
    }
}
