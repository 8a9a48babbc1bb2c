//! Structural outline of Python sources, served through the [`SymbolOracle`] port.
//!
//! The outline is derived from logical lines and indentation only: `def`, `async def` and
//! `class` headers open a scope that lasts while following code is indented deeper. Names are
//! resolved against parameters, enclosing and module-level definitions, module-level
//! assignments and `import` statements that point back into the project.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::errors::OracleError;
use crate::domain::model::{LineSpan, ScopeHandle, ScopeId, ScopeKind};
use crate::domain::oracle::SymbolOracle;

const MODULE_ID: ScopeId = ScopeId(0);
const TAB_WIDTH: usize = 8;

/// Oracle over the Python files of one checked-out project snapshot.
#[derive(Debug)]
pub struct OutlineOracle {
    root: PathBuf,
    outlines: DashMap<PathBuf, Arc<Outline>>,
}

impl OutlineOracle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            outlines: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register in-memory source for `path`, shadowing whatever is on disk.
    pub fn insert_source(&self, path: impl Into<PathBuf>, text: &str) {
        let path = path.into();
        let module = self.module_name(&path);
        let outline = Outline::build(path.clone(), module, text);
        self.outlines.insert(path, Arc::new(outline));
    }

    fn outline(&self, path: &Path) -> Result<Arc<Outline>, OracleError> {
        if let Some(entry) = self.outlines.get(path) {
            return Ok(Arc::clone(entry.value()));
        }
        let bytes = fs::read(path).map_err(|source| OracleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let outline = Arc::new(Outline::build(
            path.to_path_buf(),
            self.module_name(path),
            &text,
        ));
        tracing::trace!(path = %path.display(), nodes = outline.nodes.len(), "outlined file");
        self.outlines
            .insert(path.to_path_buf(), Arc::clone(&outline));
        Ok(outline)
    }

    /// Dotted module path of `path` relative to the project root.
    fn module_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut parts: Vec<String> = relative
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        if let Some(last) = parts.last_mut()
            && let Some(stem) = Path::new(last.as_str()).file_stem()
        {
            *last = stem.to_string_lossy().into_owned();
        }
        if parts.last().is_some_and(|last| last == "__init__") {
            parts.pop();
        }
        parts.join(".")
    }

    /// Source file backing a dotted module, if it belongs to the project.
    fn module_file(&self, module: &str) -> Option<PathBuf> {
        if module.is_empty() {
            return None;
        }
        let base = module
            .split('.')
            .fold(self.root.clone(), |path, part| path.join(part));
        let candidates = [base.with_extension("py"), base.join("__init__.py")];
        candidates
            .into_iter()
            .find(|candidate| self.outlines.contains_key(candidate) || candidate.is_file())
    }

    fn module_handle(&self, path: &Path, module: &str) -> ScopeHandle {
        ScopeHandle {
            id: MODULE_ID,
            kind: ScopeKind::Module,
            name: module.rsplit('.').next().unwrap_or_default().to_string(),
            span: None,
            file: path.to_path_buf(),
            module: module.to_string(),
        }
    }

    fn node_handle(&self, outline: &Outline, index: usize) -> ScopeHandle {
        let node = &outline.nodes[index];
        ScopeHandle {
            id: ScopeId(index + 1),
            kind: node.kind.clone(),
            name: node.name.clone(),
            span: Some(node.span),
            file: outline.path.clone(),
            module: outline.module.clone(),
        }
    }

    fn statement_handle(&self, outline: &Outline, name: &str, span: LineSpan) -> ScopeHandle {
        ScopeHandle {
            id: MODULE_ID,
            kind: ScopeKind::Statement,
            name: name.to_string(),
            span: Some(span),
            file: outline.path.clone(),
            module: outline.module.clone(),
        }
    }

    /// Module-level definition or assignment called `name` inside `module`, falling back to a
    /// submodule of that name.
    fn lookup_in_module(&self, module: &str, name: &str) -> Result<Option<ScopeHandle>, OracleError> {
        if let Some(path) = self.module_file(module) {
            let outline = self.outline(&path)?;
            if let Some(found) = self.lookup_top_level(&outline, name) {
                return Ok(Some(found));
            }
        }
        let submodule = format!("{module}.{name}");
        Ok(self
            .module_file(&submodule)
            .map(|path| self.module_handle(&path, &submodule)))
    }

    fn lookup_top_level(&self, outline: &Outline, name: &str) -> Option<ScopeHandle> {
        if let Some(index) = outline
            .top_level
            .iter()
            .copied()
            .find(|idx| outline.nodes[*idx].name == name)
        {
            return Some(self.node_handle(outline, index));
        }
        outline
            .assignments
            .get(name)
            .map(|span| self.statement_handle(outline, name, *span))
    }

    fn resolve_import(&self, target: &ImportTarget) -> Result<Option<ScopeHandle>, OracleError> {
        match target {
            ImportTarget::Module(module) => Ok(self
                .module_file(module)
                .map(|path| self.module_handle(&path, module))),
            ImportTarget::Name { module, name } => self.lookup_in_module(module, name),
        }
    }

    /// Resolve a bare name as seen from `line`.
    fn resolve_bare(
        &self,
        outline: &Outline,
        line: usize,
        name: &str,
    ) -> Result<Option<ScopeHandle>, OracleError> {
        let mut enclosing = outline.innermost_at(line);
        while let Some(index) = enclosing {
            let node = &outline.nodes[index];
            if node.kind == ScopeKind::Function {
                if node.params.iter().any(|param| param == name) {
                    let mut handle = self.node_handle(outline, index);
                    handle.kind = ScopeKind::Param;
                    handle.name = name.to_string();
                    handle.span = Some(LineSpan::new(line, line));
                    return Ok(Some(handle));
                }
                if let Some(child) = node
                    .children
                    .iter()
                    .copied()
                    .find(|child| outline.nodes[*child].name == name)
                {
                    return Ok(Some(self.node_handle(outline, child)));
                }
            }
            enclosing = node.parent;
        }

        if let Some(found) = self.lookup_top_level(outline, name) {
            return Ok(Some(found));
        }
        match outline.imports.get(name) {
            Some(target) => self.resolve_import(target),
            None => Ok(None),
        }
    }

    /// Resolve `a.b.name` by following `a` to a project module and `b` to its submodule.
    fn resolve_dotted(
        &self,
        outline: &Outline,
        line: usize,
        chain: &[String],
        name: &str,
    ) -> Result<Option<ScopeHandle>, OracleError> {
        let Some((head, rest)) = chain.split_first() else {
            return Ok(None);
        };
        let Some(root) = self.resolve_bare(outline, line, head)? else {
            return Ok(None);
        };
        if !root.is_module() {
            return Ok(None);
        }
        let mut module = root.module;
        for part in rest {
            module = format!("{module}.{part}");
            if self.module_file(&module).is_none() {
                return Ok(None);
            }
        }
        self.lookup_in_module(&module, name)
    }
}

impl SymbolOracle for OutlineOracle {
    fn scope_at(&self, file: &Path, line: usize) -> Result<ScopeHandle, OracleError> {
        let outline = self.outline(file)?;
        if line == 0 || line > outline.line_count {
            return Err(OracleError::LineOutOfRange {
                path: file.to_path_buf(),
                line,
            });
        }
        Ok(match outline.innermost_at(line) {
            Some(index) => self.node_handle(&outline, index),
            None => self.module_handle(&outline.path, &outline.module),
        })
    }

    /// Module members are top-level definitions. Class members also include class attributes,
    /// in source order.
    fn members_of(&self, scope: &ScopeHandle) -> Result<Vec<ScopeHandle>, OracleError> {
        let outline = self.outline(&scope.file)?;
        let node = match scope.kind {
            ScopeKind::Module => {
                return Ok(outline
                    .top_level
                    .iter()
                    .map(|index| self.node_handle(&outline, *index))
                    .collect());
            }
            ScopeKind::Class | ScopeKind::Function => outline.node(scope.id),
            _ => None,
        };
        let Some(node) = node else {
            return Ok(Vec::new());
        };

        let mut members: Vec<ScopeHandle> = node
            .children
            .iter()
            .map(|index| self.node_handle(&outline, *index))
            .collect();
        if node.kind == ScopeKind::Class {
            members.extend(
                node.attributes
                    .iter()
                    .map(|(name, span)| self.statement_handle(&outline, name, *span)),
            );
            members.sort_by_key(|member| member.span.map(|span| span.start));
        }
        Ok(members)
    }

    fn parent_of(&self, scope: &ScopeHandle) -> Result<Option<ScopeHandle>, OracleError> {
        if scope.is_module() {
            return Ok(None);
        }
        let outline = self.outline(&scope.file)?;
        let parent = outline.node(scope.id).and_then(|node| node.parent);
        Ok(Some(match parent {
            Some(index) => self.node_handle(&outline, index),
            None => self.module_handle(&outline.path, &outline.module),
        }))
    }

    fn resolve_references(
        &self,
        file: &Path,
        line: usize,
        column: usize,
    ) -> Result<Vec<ScopeHandle>, OracleError> {
        let outline = self.outline(file)?;
        let Some(masked) = line.checked_sub(1).and_then(|idx| outline.masked.get(idx)) else {
            return Err(OracleError::LineOutOfRange {
                path: file.to_path_buf(),
                line,
            });
        };
        let Some((name, chain)) = dotted_name_at(masked, column) else {
            return Ok(Vec::new());
        };
        let resolved = if chain.is_empty() {
            self.resolve_bare(&outline, line, &name)?
        } else {
            self.resolve_dotted(&outline, line, &chain, &name)?
        };
        Ok(resolved.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ImportTarget {
    Module(String),
    Name { module: String, name: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: ScopeKind,
    name: String,
    span: LineSpan,
    indent: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    params: Vec<String>,
    /// Assignments directly in a class body, as `(target, logical-line span)`.
    attributes: Vec<(String, LineSpan)>,
}

/// Outline of a single file.
#[derive(Debug)]
struct Outline {
    path: PathBuf,
    module: String,
    line_count: usize,
    nodes: Vec<Node>,
    top_level: Vec<usize>,
    assignments: HashMap<String, LineSpan>,
    imports: HashMap<String, ImportTarget>,
    /// Physical lines with string contents and comments blanked out.
    masked: Vec<String>,
}

impl Outline {
    fn build(path: PathBuf, module: String, text: &str) -> Self {
        let scan = scan_logical_lines(text);
        let package = package_of(&module, &path);

        let mut nodes: Vec<Node> = Vec::new();
        let mut top_level = Vec::new();
        let mut assignments = HashMap::new();
        let mut imports = HashMap::new();
        let mut open: Vec<usize> = Vec::new();

        for logical in &scan.logical {
            while let Some(&last) = open.last() {
                if nodes[last].indent >= logical.indent {
                    open.pop();
                } else {
                    break;
                }
            }
            for index in &open {
                nodes[*index].span.end = logical.end;
            }

            if let Some((kind, name)) = definition_header(&logical.text) {
                let params = if kind == ScopeKind::Function {
                    parameters(&logical.text)
                } else {
                    Vec::new()
                };
                let index = nodes.len();
                let parent = open.last().copied();
                nodes.push(Node {
                    kind,
                    name: name.to_string(),
                    span: LineSpan::new(logical.start, logical.end),
                    indent: logical.indent,
                    parent,
                    children: Vec::new(),
                    params,
                    attributes: Vec::new(),
                });
                match parent {
                    Some(parent) => nodes[parent].children.push(index),
                    None => top_level.push(index),
                }
                open.push(index);
                continue;
            }

            if let Some(target) = assignment_target(&logical.text) {
                let span = LineSpan::new(logical.start, logical.end);
                match open.last() {
                    None => {
                        assignments.entry(target.to_string()).or_insert(span);
                    }
                    Some(&owner) if nodes[owner].kind == ScopeKind::Class => {
                        nodes[owner].attributes.push((target.to_string(), span));
                    }
                    Some(_) => {}
                }
            }
            parse_import(&logical.text, &package, &mut imports);
        }

        Self {
            path,
            module,
            line_count: scan.masked.len(),
            nodes,
            top_level,
            assignments,
            imports,
            masked: scan.masked,
        }
    }

    fn node(&self, id: ScopeId) -> Option<&Node> {
        id.0.checked_sub(1).and_then(|index| self.nodes.get(index))
    }

    /// Deepest definition whose span contains `line`.
    fn innermost_at(&self, line: usize) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.span.contains(line))
            .max_by_key(|(_, node)| (node.span.start, node.indent))
            .map(|(index, _)| index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogicalLine {
    start: usize,
    end: usize,
    indent: usize,
    text: String,
}

#[derive(Debug, Default)]
struct Scan {
    logical: Vec<LogicalLine>,
    masked: Vec<String>,
}

/// Split source into logical lines, joining bracket, string and backslash continuations.
fn scan_logical_lines(text: &str) -> Scan {
    let mut scan = Scan::default();
    let mut depth = 0usize;
    let mut string: Option<(char, bool)> = None;
    let mut continued = false;

    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let starts_new = depth == 0 && string.is_none() && !continued;
        let chars: Vec<char> = raw.chars().collect();
        let mut masked = String::with_capacity(raw.len());
        let mut has_code = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some((quote, triple)) = string {
                has_code |= !c.is_whitespace();
                if c == '\\' {
                    masked.push(' ');
                    if i + 1 < chars.len() {
                        masked.push(' ');
                    }
                    i += 2;
                    continue;
                }
                if c == quote {
                    if !triple {
                        string = None;
                    } else if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                        masked.push_str("   ");
                        string = None;
                        i += 3;
                        continue;
                    }
                }
                masked.push(' ');
                i += 1;
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' => {
                    has_code = true;
                    let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                    string = Some((c, triple));
                    if triple {
                        masked.push_str("   ");
                        i += 3;
                        continue;
                    }
                    masked.push(' ');
                }
                '(' | '[' | '{' => {
                    has_code = true;
                    depth += 1;
                    masked.push(c);
                }
                ')' | ']' | '}' => {
                    has_code = true;
                    depth = depth.saturating_sub(1);
                    masked.push(c);
                }
                _ => {
                    has_code |= !c.is_whitespace();
                    masked.push(c);
                }
            }
            i += 1;
        }

        if let Some((_, false)) = string
            && !raw.ends_with('\\')
        {
            string = None;
        }
        continued = string.is_none() && masked.trim_end().ends_with('\\');

        if starts_new {
            if has_code {
                scan.logical.push(LogicalLine {
                    start: number,
                    end: number,
                    indent: indent_width(raw),
                    text: masked.trim().to_string(),
                });
            }
        } else if let Some(current) = scan.logical.last_mut() {
            current.end = number;
            let piece = masked.trim().trim_end_matches('\\');
            if !piece.is_empty() {
                current.text = current.text.trim_end_matches('\\').to_string();
                current.text.push(' ');
                current.text.push_str(piece);
            }
        }
        scan.masked.push(masked);
    }
    scan
}

fn indent_width(raw: &str) -> usize {
    let mut width = 0;
    for c in raw.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
            _ => break,
        }
    }
    width
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Leading identifier of `text` and the remainder after it.
fn take_identifier(text: &str) -> Option<(&str, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !is_ident_start(first) {
        return None;
    }
    let end = chars
        .find(|(_, c)| !is_ident_char(*c))
        .map_or(text.len(), |(idx, _)| idx);
    Some((&text[..end], &text[end..]))
}

fn definition_header(text: &str) -> Option<(ScopeKind, &str)> {
    let (kind, rest) = if let Some(rest) = text.strip_prefix("class") {
        (ScopeKind::Class, rest)
    } else if let Some(rest) = text.strip_prefix("def") {
        (ScopeKind::Function, rest)
    } else if let Some(rest) = text.strip_prefix("async") {
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        (ScopeKind::Function, rest.trim_start().strip_prefix("def")?)
    } else {
        return None;
    };
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, _) = take_identifier(rest.trim_start())?;
    Some((kind, name))
}

/// Parameter names of a `def` header, without annotations, defaults or star prefixes.
fn parameters(header: &str) -> Vec<String> {
    let Some(open) = header.find('(') else {
        return Vec::new();
    };
    let mut depth = 0usize;
    let mut current = String::new();
    let mut pieces = Vec::new();
    for c in header[open + 1..].chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' if depth == 0 => break,
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);

    pieces
        .iter()
        .filter_map(|piece| {
            let name = piece
                .split([':', '='])
                .next()
                .unwrap_or_default()
                .trim()
                .trim_start_matches('*');
            take_identifier(name).map(|(ident, _)| ident.to_string())
        })
        .collect()
}

/// Name bound by a simple `name = ...` or `name: T = ...` statement.
fn assignment_target(text: &str) -> Option<&str> {
    let (name, rest) = take_identifier(text)?;
    let rest = rest.trim_start();
    let value = if let Some(annotated) = rest.strip_prefix(':') {
        let eq = annotated.find('=')?;
        &annotated[eq..]
    } else {
        rest
    };
    let after = value.strip_prefix('=')?;
    if after.starts_with('=') {
        return None;
    }
    Some(name)
}

/// Package that relative imports of `module` are resolved against.
fn package_of(module: &str, path: &Path) -> String {
    let is_package = path.file_stem().is_some_and(|stem| stem == "__init__");
    if is_package {
        return module.to_string();
    }
    match module.rsplit_once('.') {
        Some((package, _)) => package.to_string(),
        None => String::new(),
    }
}

fn absolute_module(package: &str, spec: &str) -> Option<String> {
    let dots = spec.chars().take_while(|c| *c == '.').count();
    let rest = &spec[dots..];
    if dots == 0 {
        return Some(rest.to_string());
    }
    let mut parts: Vec<&str> = if package.is_empty() {
        Vec::new()
    } else {
        package.split('.').collect()
    };
    for _ in 1..dots {
        parts.pop()?;
    }
    if !rest.is_empty() {
        parts.push(rest);
    }
    Some(parts.join("."))
}

fn parse_import(text: &str, package: &str, imports: &mut HashMap<String, ImportTarget>) {
    if let Some(rest) = text.strip_prefix("import ") {
        for item in rest.split(',') {
            let mut words = item.split_whitespace();
            let Some(module) = words.next() else { continue };
            match (words.next(), words.next()) {
                (Some("as"), Some(alias)) => {
                    imports.insert(alias.to_string(), ImportTarget::Module(module.to_string()));
                }
                _ => {
                    let head = module.split('.').next().unwrap_or(module);
                    imports.insert(head.to_string(), ImportTarget::Module(head.to_string()));
                }
            }
        }
        return;
    }

    let Some(rest) = text.strip_prefix("from ") else {
        return;
    };
    let Some((spec, names)) = rest.split_once(" import ") else {
        return;
    };
    let Some(module) = absolute_module(package, spec.trim()) else {
        return;
    };
    let names = names.trim().trim_start_matches('(').trim_end_matches(')');
    for item in names.split(',') {
        let mut words = item.split_whitespace();
        let Some(name) = words.next() else { continue };
        if name == "*" {
            continue;
        }
        let binding = match (words.next(), words.next()) {
            (Some("as"), Some(alias)) => alias,
            _ => name,
        };
        let target = if module.is_empty() {
            ImportTarget::Module(name.to_string())
        } else {
            ImportTarget::Name {
                module: module.clone(),
                name: name.to_string(),
            }
        };
        imports.insert(binding.to_string(), target);
    }
}

/// Identifier covering `column` plus the dotted prefix chain in front of it.
fn dotted_name_at(masked: &str, column: usize) -> Option<(String, Vec<String>)> {
    let chars: Vec<char> = masked.chars().collect();
    if !chars.get(column).copied().is_some_and(is_ident_char) {
        return None;
    }
    let mut start = column;
    while start > 0 && is_ident_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = column;
    while end < chars.len() && is_ident_char(chars[end]) {
        end += 1;
    }
    if !is_ident_start(chars[start]) {
        return None;
    }
    let name: String = chars[start..end].iter().collect();

    let mut chain = Vec::new();
    let mut cursor = start;
    while cursor > 0 && chars[cursor - 1] == '.' {
        let seg_end = cursor - 1;
        let mut seg_start = seg_end;
        while seg_start > 0 && is_ident_char(chars[seg_start - 1]) {
            seg_start -= 1;
        }
        if seg_start == seg_end || !is_ident_start(chars[seg_start]) {
            return None;
        }
        chain.push(chars[seg_start..seg_end].iter().collect::<String>());
        cursor = seg_start;
    }
    chain.reverse();
    Some((name, chain))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle_with(files: &[(&str, &str)]) -> OutlineOracle {
        let oracle = OutlineOracle::new("");
        for (path, text) in files {
            oracle.insert_source(*path, text);
        }
        oracle
    }

    fn span_of(handle: &ScopeHandle) -> (usize, usize) {
        let span = handle.span.expect("span");
        (span.start, span.end)
    }

    const SAMPLE: &str = concat!(
        "import os\n",                              // 1
        "\n",                                       // 2
        "LIMIT = 10\n",                             // 3
        "\n",                                       // 4
        "class Repo:\n",                            // 5
        "    \"\"\"Stores things.\n",               // 6
        "\n",                                       // 7
        "def not_a_def(): inside docstring\n",      // 8
        "    \"\"\"\n",                             // 9
        "    kind = 'repo'\n",                      // 10
        "\n",                                       // 11
        "    def load(self, path,\n",               // 12
        "             mode='r'):\n",                // 13
        "        # comment at any depth\n",         // 14
        "        return open(path, mode)\n",        // 15
        "\n",                                       // 16
        "# trailing comment\n",                     // 17
        "    async def save(self, *items, **kw):\n", // 18
        "        pass\n",                           // 19
        "\n",                                       // 20
        "def helper(x: int = 1) -> int:\n",         // 21
        "    def inner():\n",                       // 22
        "        return x\n",                       // 23
        "    return inner() + LIMIT\n",             // 24
    );

    #[test]
    fn definitions_get_spans_parents_and_members() -> anyhow::Result<()> {
        let oracle = oracle_with(&[("pkg/mod.py", SAMPLE)]);
        let file = Path::new("pkg/mod.py");

        let repo = oracle.scope_at(file, 10)?;
        assert_eq!(repo.kind, ScopeKind::Class);
        assert_eq!(repo.name, "Repo");
        assert_eq!(span_of(&repo), (5, 19));
        assert_eq!(repo.module, "pkg.mod");

        let members = oracle.members_of(&repo)?;
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["kind", "load", "save"]);
        assert_eq!(members[0].kind, ScopeKind::Statement);
        assert_eq!(span_of(&members[0]), (10, 10));
        assert_eq!(span_of(&members[1]), (12, 15));
        assert_eq!(span_of(&members[2]), (18, 19));

        let load = oracle.scope_at(file, 13)?;
        assert_eq!(load.name, "load");
        let parent = oracle.parent_of(&load)?.expect("class parent");
        assert_eq!(parent.name, "Repo");
        let module = oracle.parent_of(&parent)?.expect("module parent");
        assert!(module.is_module());
        assert!(oracle.parent_of(&module)?.is_none());
        Ok(())
    }

    #[test]
    fn docstring_lines_do_not_open_definitions() -> anyhow::Result<()> {
        let oracle = oracle_with(&[("pkg/mod.py", SAMPLE)]);
        let module = oracle.scope_at(Path::new("pkg/mod.py"), 3)?;
        assert!(module.is_module());
        let top: Vec<_> = oracle
            .members_of(&module)?
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(top, vec!["Repo".to_string(), "helper".to_string()]);
        Ok(())
    }

    #[test]
    fn nested_function_is_innermost_scope() -> anyhow::Result<()> {
        let oracle = oracle_with(&[("pkg/mod.py", SAMPLE)]);
        let inner = oracle.scope_at(Path::new("pkg/mod.py"), 23)?;
        assert_eq!(inner.name, "inner");
        assert_eq!(span_of(&inner), (22, 23));
        let helper = oracle.scope_at(Path::new("pkg/mod.py"), 24)?;
        assert_eq!(span_of(&helper), (21, 24));
        Ok(())
    }

    #[test]
    fn line_out_of_range_is_reported() {
        let oracle = oracle_with(&[("pkg/mod.py", SAMPLE)]);
        let err = oracle.scope_at(Path::new("pkg/mod.py"), 99).unwrap_err();
        assert!(matches!(err, OracleError::LineOutOfRange { line: 99, .. }));
    }

    #[test]
    fn resolves_params_locals_and_module_names() -> anyhow::Result<()> {
        let oracle = oracle_with(&[("pkg/mod.py", SAMPLE)]);
        let file = Path::new("pkg/mod.py");

        // `x` inside inner() is helper's parameter
        let param = oracle.resolve_references(file, 23, 15)?;
        assert_eq!(param.len(), 1);
        assert_eq!(param[0].kind, ScopeKind::Param);

        // `inner` call
        let inner = oracle.resolve_references(file, 24, 12)?;
        assert_eq!(inner[0].name, "inner");
        assert_eq!(inner[0].kind, ScopeKind::Function);

        // `LIMIT` is a module-level assignment
        let limit = oracle.resolve_references(file, 24, 24)?;
        assert_eq!(limit[0].kind, ScopeKind::Statement);
        assert_eq!(span_of(&limit[0]), (3, 3));

        // whitespace and string contents resolve to nothing
        assert!(oracle.resolve_references(file, 24, 0)?.is_empty());
        assert!(oracle.resolve_references(file, 10, 13)?.is_empty());
        Ok(())
    }

    #[test]
    fn follows_project_imports_across_files() -> anyhow::Result<()> {
        let oracle = oracle_with(&[
            (
                "pkg/views.py",
                "from .util import clean as scrub\nfrom pkg import models\nimport requests\n\ndef show(v):\n    return scrub(models.fetch(v), requests.get)\n",
            ),
            ("pkg/util.py", "def clean(v):\n    return v.strip()\n"),
            ("pkg/models.py", "def fetch(v):\n    return v\n"),
            ("pkg/__init__.py", ""),
        ]);
        let file = Path::new("pkg/views.py");

        let scrub = oracle.resolve_references(file, 6, 12)?;
        assert_eq!(scrub[0].name, "clean");
        assert_eq!(scrub[0].file, PathBuf::from("pkg/util.py"));
        assert_eq!(span_of(&scrub[0]), (1, 2));

        let models = oracle.resolve_references(file, 6, 19)?;
        assert_eq!(models[0].kind, ScopeKind::Module);
        assert_eq!(models[0].module, "pkg.models");

        let fetch = oracle.resolve_references(file, 6, 27)?;
        assert_eq!(fetch[0].name, "fetch");
        assert_eq!(fetch[0].file, PathBuf::from("pkg/models.py"));

        // third-party module has no source under the project root
        assert!(oracle.resolve_references(file, 6, 35)?.is_empty());
        Ok(())
    }

    #[test]
    fn parameters_strip_annotations_defaults_and_stars() {
        assert_eq!(
            parameters("def f(self, a: Dict[str, int] = {}, *args, b=(1, 2), **kw) -> None:"),
            vec!["self", "a", "args", "b", "kw"]
        );
        assert!(parameters("def f():").is_empty());
    }

    #[test]
    fn assignment_targets_ignore_comparisons() {
        assert_eq!(assignment_target("LIMIT = 10"), Some("LIMIT"));
        assert_eq!(assignment_target("name: str = 'x'"), Some("name"));
        assert_eq!(assignment_target("a == b"), None);
        assert_eq!(assignment_target("call(x=1)"), None);
    }

    #[test]
    fn relative_imports_resolve_against_package() {
        assert_eq!(absolute_module("pkg.sub", ".util").as_deref(), Some("pkg.sub.util"));
        assert_eq!(absolute_module("pkg.sub", "..core").as_deref(), Some("pkg.core"));
        assert_eq!(absolute_module("", "..core"), None);
        assert_eq!(absolute_module("pkg", "os.path").as_deref(), Some("os.path"));
    }

    #[test]
    fn backslash_and_one_line_definitions() -> anyhow::Result<()> {
        let oracle = oracle_with(&[(
            "m.py",
            "class Empty: pass\nx = 1 + \\\n    2\ndef f(): return x\n",
        )]);
        let file = Path::new("m.py");
        let empty = oracle.scope_at(file, 1)?;
        assert_eq!(span_of(&empty), (1, 1));
        assert!(oracle.members_of(&empty)?.is_empty());
        assert!(oracle.scope_at(file, 3)?.is_module());
        assert_eq!(span_of(&oracle.scope_at(file, 4)?), (4, 4));
        Ok(())
    }
}
