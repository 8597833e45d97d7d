//! Layer registry and the file-backed layer providers.
//!
//! Content lives under the project runtime directory:
//!
//! | Layer | Source |
//! |-------|--------|
//! | L0 constitution | `constitution.md` |
//! | L1 global | `global.md` |
//! | L2 agent | `agents/<active agent>.md` |
//! | L3 workflow | `workflows/<active workflow>.md` |
//! | L4 task | `tasks/<active task>.md` |
//! | L5 squad | `squads/<active squad>.md` |
//! | L6 keyword | `keywords/<word>.md` for each word of the prompt with a file |
//! | L7 star-command | `commands/<cmd>.md` for each `*cmd` in the prompt |
//!
//! A missing file renders as empty content.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tessera_core::error::LayerError;
use tessera_core::layer::{LayerContext, LayerProvider, ManifestLayer};
use tessera_core::session::Session;
use tracing::warn;

/// Result of rendering one layer, after error containment.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Content(String),
    Empty,
    /// No provider is registered for the layer.
    Missing,
    Failed(String),
}

/// Maps each manifest layer to at most one provider.
#[derive(Default)]
pub struct LayerRegistry {
    providers: BTreeMap<ManifestLayer, Box<dyn LayerProvider>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard file-backed providers rooted at `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut registry = Self::new();
        registry.register(FileLayer::new(ManifestLayer::Constitution, dir.join("constitution.md")));
        registry.register(FileLayer::new(ManifestLayer::Global, dir.join("global.md")));
        for kind in [
            ActivityKind::Agent,
            ActivityKind::Workflow,
            ActivityKind::Task,
            ActivityKind::Squad,
        ] {
            registry.register(ActivityLayer::new(kind, &dir));
        }
        registry.register(KeywordLayer::new(dir.join("keywords")));
        registry.register(StarCommandLayer::new(dir.join("commands")));
        registry
    }

    /// Register a provider, replacing any previous one for the same layer.
    pub fn register<P: LayerProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.layer(), Box::new(provider));
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Render `layer`. Provider errors are logged and contained here.
    pub fn render(&self, layer: ManifestLayer, ctx: &LayerContext<'_>) -> Rendered {
        let Some(provider) = self.providers.get(&layer) else {
            return Rendered::Missing;
        };
        match provider.render(ctx) {
            Ok(text) if text.trim().is_empty() => Rendered::Empty,
            Ok(text) => Rendered::Content(text.trim_end().to_string()),
            Err(e) => {
                warn!(layer = %layer, error = %e, "Layer provider failed");
                Rendered::Failed(e.to_string())
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<String, LayerError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(LayerError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Ids become file stems; anything that could leave the directory is refused.
fn safe_stem(id: &str) -> bool {
    !id.is_empty() && !id.contains("..") && !id.contains('/') && !id.contains('\\')
}

/// A layer whose content is one fixed file.
pub struct FileLayer {
    layer: ManifestLayer,
    path: PathBuf,
}

impl FileLayer {
    pub fn new(layer: ManifestLayer, path: impl Into<PathBuf>) -> Self {
        Self {
            layer,
            path: path.into(),
        }
    }
}

impl LayerProvider for FileLayer {
    fn layer(&self) -> ManifestLayer {
        self.layer
    }

    fn render(&self, _ctx: &LayerContext<'_>) -> Result<String, LayerError> {
        read_optional(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Agent,
    Workflow,
    Task,
    Squad,
}

impl ActivityKind {
    fn layer(self) -> ManifestLayer {
        match self {
            Self::Agent => ManifestLayer::Agent,
            Self::Workflow => ManifestLayer::Workflow,
            Self::Task => ManifestLayer::Task,
            Self::Squad => ManifestLayer::Squad,
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Workflow => "workflows",
            Self::Task => "tasks",
            Self::Squad => "squads",
        }
    }

    fn active_id(self, session: &Session) -> Option<&str> {
        match self {
            Self::Agent => session.agent_id(),
            Self::Workflow => session.active_workflow.as_ref().map(|a| a.id.as_str()),
            Self::Task => session.active_task.as_ref().map(|a| a.id.as_str()),
            Self::Squad => session.active_squad.as_ref().map(|a| a.id.as_str()),
        }
    }
}

/// A layer keyed on the session's active agent, workflow, task or squad.
pub struct ActivityLayer {
    kind: ActivityKind,
    dir: PathBuf,
}

impl ActivityLayer {
    pub fn new(kind: ActivityKind, root: &Path) -> Self {
        Self {
            kind,
            dir: root.join(kind.dir_name()),
        }
    }
}

impl LayerProvider for ActivityLayer {
    fn layer(&self) -> ManifestLayer {
        self.kind.layer()
    }

    fn render(&self, ctx: &LayerContext<'_>) -> Result<String, LayerError> {
        match self.kind.active_id(ctx.session) {
            Some(id) if safe_stem(id) => read_optional(&self.dir.join(format!("{id}.md"))),
            Some(id) => Err(LayerError::Render {
                layer: self.layer().name().into(),
                reason: format!("unsafe id {id:?}"),
            }),
            None => Ok(String::new()),
        }
    }
}

/// Lower-cased words of `input`, split on anything but letters, digits,
/// `-` and `_`. Order-preserving, without duplicates.
pub fn words(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in input
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

/// `*command` tokens in `input`, without the star, in order of appearance.
pub fn star_commands(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in input.split_whitespace() {
        let Some(rest) = token.strip_prefix('*') else {
            continue;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn render_sections(dir: &Path, names: &[String], heading: impl Fn(&str) -> String) -> Result<String, LayerError> {
    let mut sections = Vec::new();
    for name in names {
        let text = read_optional(&dir.join(format!("{name}.md")))?;
        let text = text.trim();
        if !text.is_empty() {
            sections.push(format!("{}\n{text}", heading(name)));
        }
    }
    Ok(sections.join("\n\n"))
}

/// Injects `keywords/<word>.md` for every prompt word that has a file.
pub struct KeywordLayer {
    dir: PathBuf,
}

impl KeywordLayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LayerProvider for KeywordLayer {
    fn layer(&self) -> ManifestLayer {
        ManifestLayer::Keyword
    }

    fn render(&self, ctx: &LayerContext<'_>) -> Result<String, LayerError> {
        if !self.dir.is_dir() {
            return Ok(String::new());
        }
        let words: Vec<String> = words(ctx.turn_input)
            .into_iter()
            .filter(|w| safe_stem(w))
            .collect();
        render_sections(&self.dir, &words, |w| format!("## {w}"))
    }
}

/// Injects `commands/<cmd>.md` for every `*cmd` in the prompt.
pub struct StarCommandLayer {
    dir: PathBuf,
}

impl StarCommandLayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LayerProvider for StarCommandLayer {
    fn layer(&self) -> ManifestLayer {
        ManifestLayer::StarCommand
    }

    fn render(&self, ctx: &LayerContext<'_>) -> Result<String, LayerError> {
        let commands = star_commands(ctx.turn_input);
        if commands.is_empty() {
            return Ok(String::new());
        }
        render_sections(&self.dir, &commands, |c| format!("## *{c}"))
    }
}
