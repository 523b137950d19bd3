//! Recursive loading of files that reference other files.
//!
//! A root file (orchestrator) lists group files, which list worker files.
//! Each file is resolved on its own, then its reference fields are followed
//! depth-first. The stack of open `(file, schema)` pairs belongs to one
//! top-level call and is threaded through the recursion: re-entering a pair
//! that is still open is a cycle, while siblings reusing a file are fine.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::resolved::{ResolvedChild, ResolvedSettings};
use crate::config::schema::{FieldKind, SchemaRegistry, SettingsSchema};
use crate::error::{Error, Result};

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenFile {
    path: PathBuf,
    schema: &'static str,
}

/// Files currently open in one recursive load.
#[derive(Debug)]
pub struct ReferenceGraph {
    stack: Vec<OpenFile>,
    max_depth: usize,
}

impl ReferenceGraph {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn enter(&mut self, path: &Path, schema: &'static str) -> Result<()> {
        let entry = OpenFile {
            path: path.to_path_buf(),
            schema,
        };
        if self.stack.contains(&entry) {
            let mut stack = self.rendered();
            stack.push(path.display().to_string());
            return Err(Error::CycleDetected { stack });
        }

        self.stack.push(entry);
        if self.stack.len() > self.max_depth {
            let error = Error::DepthExceeded {
                depth: self.stack.len(),
                max_depth: self.max_depth,
                stack: self.rendered(),
            };
            self.stack.pop();
            return Err(error);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }

    fn rendered(&self) -> Vec<String> {
        self.stack
            .iter()
            .map(|open| open.path.display().to_string())
            .collect()
    }
}

/// Walks a reference tree, resolving every file through `resolve_file`.
pub struct GraphLoader<'a, F> {
    registry: &'a SchemaRegistry,
    workspace_root: &'a Path,
    max_depth: usize,
    resolve_file: F,
}

impl<'a, F> GraphLoader<'a, F>
where
    F: FnMut(&'static SettingsSchema, &Path) -> Result<ResolvedSettings>,
{
    pub fn new(
        registry: &'a SchemaRegistry,
        workspace_root: &'a Path,
        max_depth: usize,
        resolve_file: F,
    ) -> Self {
        Self {
            registry,
            workspace_root,
            max_depth,
            resolve_file,
        }
    }

    pub fn load(&mut self, root_path: &Path, schema: &'static SettingsSchema) -> Result<ResolvedSettings> {
        let mut graph = ReferenceGraph::new(self.max_depth);
        let root = self.workspace_path(root_path);
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        self.visit(&mut graph, &root, schema)
    }

    fn visit(
        &mut self,
        graph: &mut ReferenceGraph,
        path: &Path,
        schema: &'static SettingsSchema,
    ) -> Result<ResolvedSettings> {
        let mut node = (self.resolve_file)(schema, path)?;
        graph.enter(path, schema.name)?;
        debug!(schema = schema.name, file = %path.display(), depth = graph.depth(), "entered reference");

        let outcome = self.follow_references(graph, &mut node, schema);
        graph.leave();
        outcome?;
        Ok(node)
    }

    fn follow_references(
        &mut self,
        graph: &mut ReferenceGraph,
        node: &mut ResolvedSettings,
        schema: &'static SettingsSchema,
    ) -> Result<()> {
        for (path, spec) in schema.leaf_fields() {
            let Some(child_name) = spec.kind.reference_schema() else {
                continue;
            };
            let field = path.to_string();
            let child_schema = self.registry.get(child_name)?;
            let targets: Vec<String> = match node.value(&field) {
                Some(Value::String(target)) => vec![target.clone()],
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
                _ => continue,
            };

            let mut resolved = Vec::with_capacity(targets.len());
            for target in &targets {
                let location = self.locate(schema, &field, target)?;
                resolved.push(self.visit(graph, &location, child_schema)?);
            }

            let child = match spec.kind {
                FieldKind::ReferenceList { .. } => ResolvedChild::Many(resolved),
                _ => match resolved.pop() {
                    Some(single) => ResolvedChild::One(Box::new(single)),
                    None => continue,
                },
            };
            node.attach(&field, child);
        }
        Ok(())
    }

    /// Relative targets are joined onto the workspace root.
    fn locate(&self, schema: &SettingsSchema, field: &str, target: &str) -> Result<PathBuf> {
        let joined = self.workspace_path(Path::new(target));
        let failure = |message: String| Error::ReferenceResolution {
            schema: schema.name.to_owned(),
            field: field.to_owned(),
            path: joined.clone(),
            message,
        };

        if !joined.is_file() {
            return Err(failure("referenced file does not exist".to_owned()));
        }
        std::fs::canonicalize(&joined).map_err(|err| failure(format!("cannot read file: {err}")))
    }

    fn workspace_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceGraph;
    use crate::error::Error;
    use std::path::Path;

    #[test]
    fn reentering_an_open_file_is_a_cycle() {
        let mut graph = ReferenceGraph::new(10);
        graph.enter(Path::new("/ws/a.toml"), "node").expect("a");
        graph.enter(Path::new("/ws/b.toml"), "node").expect("b");
        let error = graph
            .enter(Path::new("/ws/a.toml"), "node")
            .expect_err("a is still open");
        match error {
            Error::CycleDetected { stack } => {
                assert_eq!(stack, vec!["/ws/a.toml", "/ws/b.toml", "/ws/a.toml"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_file_under_another_schema_is_not_a_cycle() {
        let mut graph = ReferenceGraph::new(10);
        graph.enter(Path::new("/ws/a.toml"), "group").expect("group");
        graph.enter(Path::new("/ws/a.toml"), "worker").expect("worker");
        assert_eq!(graph.depth(), 2);
    }

    #[test]
    fn leaving_allows_sibling_reuse() {
        let mut graph = ReferenceGraph::new(10);
        graph.enter(Path::new("/ws/root.toml"), "group").expect("root");
        graph.enter(Path::new("/ws/w.toml"), "worker").expect("first");
        graph.leave();
        graph.enter(Path::new("/ws/w.toml"), "worker").expect("sibling");
    }

    #[test]
    fn depth_beyond_maximum_fails() {
        let mut graph = ReferenceGraph::new(2);
        graph.enter(Path::new("/1"), "n").expect("1");
        graph.enter(Path::new("/2"), "n").expect("2");
        let error = graph.enter(Path::new("/3"), "n").expect_err("too deep");
        match error {
            Error::DepthExceeded {
                depth,
                max_depth,
                stack,
            } => {
                assert_eq!(depth, 3);
                assert_eq!(max_depth, 2);
                assert_eq!(stack.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(graph.depth(), 2);
    }
}
