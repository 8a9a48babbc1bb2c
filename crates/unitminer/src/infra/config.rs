//! Layered `unitminer` settings: embedded defaults, user file, workspace file, environment.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::{config_dir, home_dir};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::context::ContextMode;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".unitminer/config.toml";

/// Effective mining settings after every layer has been merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub languages: Languages,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub normalize: Normalize,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub batch: Batch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Paths {
    #[serde(default)]
    repos_dir: Option<PathBuf>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

impl Paths {
    fn default_repos_dir() -> PathBuf {
        home_dir()
            .map(|home| home.join("repos"))
            .unwrap_or_else(|| PathBuf::from("repos"))
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from("data")
    }

    /// Directory holding one clone per `owner/name` repository.
    pub fn repos_dir(&self) -> PathBuf {
        self.repos_dir.clone().unwrap_or_else(Self::default_repos_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(Self::default_output_dir)
    }

    pub fn set_repos_dir(&mut self, path: PathBuf) {
        self.repos_dir = Some(path);
    }

    pub fn set_output_dir(&mut self, path: PathBuf) {
        self.output_dir = Some(path);
    }
}

/// Language labels and the extractor each one is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Languages {
    #[serde(default = "Languages::default_python")]
    pub python: Vec<String>,
    #[serde(default = "Languages::default_raw")]
    pub raw: Vec<String>,
}

impl Languages {
    fn default_python() -> Vec<String> {
        vec!["Python".into()]
    }

    fn default_raw() -> Vec<String> {
        ["C/C++", "HTML", "JavaScript/TypeScript", "Shell", "Jinja2"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for Languages {
    fn default() -> Self {
        Self {
            python: Self::default_python(),
            raw: Self::default_raw(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Filter {
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    #[serde(default)]
    pub patch_markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Normalize {
    #[serde(default)]
    strip_comments: Option<bool>,
}

impl Normalize {
    pub fn strip_comments(&self) -> bool {
        self.strip_comments.unwrap_or(true)
    }

    pub fn set_strip_comments(&mut self, value: bool) {
        self.strip_comments = Some(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSettings {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    mode: Option<ContextMode>,
}

impl ContextSettings {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn mode(&self) -> ContextMode {
        self.mode.unwrap_or_default()
    }

    pub fn set_enabled(&mut self, value: bool) {
        self.enabled = Some(value);
    }

    pub fn set_mode(&mut self, mode: ContextMode) {
        self.mode = Some(mode);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Batch {
    /// Worker threads; `0` lets rayon decide.
    #[serde(default)]
    pub jobs: usize,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub resume: bool,
}

/// `UNITMINER_*` variables applied on top of the file layers.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    repos_dir: Option<String>,
    output_dir: Option<String>,
    context_mode: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            repos_dir: env::var("UNITMINER_REPOS_DIR").ok(),
            output_dir: env::var("UNITMINER_OUTPUT_DIR").ok(),
            context_mode: env::var("UNITMINER_CONTEXT_MODE").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(repos_dir: &str, output_dir: &str, context_mode: &str) -> Self {
        Self {
            repos_dir: Some(repos_dir.to_owned()),
            output_dir: Some(output_dir.to_owned()),
            context_mode: Some(context_mode.to_owned()),
        }
    }
}

impl Config {
    /// Merge the embedded defaults, `~/.config/unitminer`, `.unitminer/` and `UNITMINER_*`.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    /// Built-in defaults only, ignoring config files and the environment.
    pub fn builtin() -> Result<Self> {
        Self::load_with_layers(None, None, EnvOverrides::default())
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        apply_env_overrides(merged, env_overrides)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).context("invalid unitminer config")?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            paths: merge_paths(self.paths, other.paths),
            languages: merge_languages(self.languages, other.languages),
            filter: merge_filter(self.filter, other.filter),
            normalize: merge_normalize(self.normalize, other.normalize),
            context: merge_context(self.context, other.context),
            batch: merge_batch(self.batch, other.batch),
        }
    }
}

fn merge_paths(mut base: Paths, overlay: Paths) -> Paths {
    if let Some(value) = overlay.repos_dir {
        base.repos_dir = Some(value);
    }
    if let Some(value) = overlay.output_dir {
        base.output_dir = Some(value);
    }
    base
}

fn merge_languages(base: Languages, overlay: Languages) -> Languages {
    Languages {
        python: choose_list(base.python, overlay.python, Languages::default_python),
        raw: choose_list(base.raw, overlay.raw, Languages::default_raw),
    }
}

fn choose_list(base: Vec<String>, overlay: Vec<String>, default_fn: fn() -> Vec<String>) -> Vec<String> {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn merge_filter(base: Filter, overlay: Filter) -> Filter {
    let union = |base: Vec<String>, overlay: Vec<String>| -> Vec<String> {
        let mut set: BTreeSet<String> = base.into_iter().collect();
        set.extend(overlay);
        set.into_iter().collect()
    };
    Filter {
        exclude_globs: union(base.exclude_globs, overlay.exclude_globs),
        exclude_extensions: union(base.exclude_extensions, overlay.exclude_extensions),
        patch_markers: union(base.patch_markers, overlay.patch_markers),
    }
}

fn merge_normalize(mut base: Normalize, overlay: Normalize) -> Normalize {
    if let Some(value) = overlay.strip_comments {
        base.strip_comments = Some(value);
    }
    base
}

fn merge_context(mut base: ContextSettings, overlay: ContextSettings) -> ContextSettings {
    if let Some(value) = overlay.enabled {
        base.enabled = Some(value);
    }
    if let Some(value) = overlay.mode {
        base.mode = Some(value);
    }
    base
}

fn merge_batch(base: Batch, overlay: Batch) -> Batch {
    Batch {
        jobs: if overlay.jobs != 0 { overlay.jobs } else { base.jobs },
        fail_fast: overlay.fail_fast || base.fail_fast,
        resume: overlay.resume || base.resume,
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("unitminer/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Result<Config> {
    if let Some(repos_dir) = env.repos_dir {
        config.paths.repos_dir = Some(PathBuf::from(repos_dir));
    }
    if let Some(output_dir) = env.output_dir {
        config.paths.output_dir = Some(PathBuf::from(output_dir));
    }
    if let Some(mode) = env.context_mode {
        let mode = mode
            .parse::<ContextMode>()
            .with_context(|| "invalid UNITMINER_CONTEXT_MODE".to_string())?;
        config.context.mode = Some(mode);
    }
    Ok(config)
}
