//! Merge configuration loaded from a YAML file.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

/// Output destination meaning standard output.
pub const STDOUT: &str = "-";

/// One merge job: where to read, what to render, what to write back.
///
/// Unknown keys are rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Base URL of the Grist installation (e.g. `https://docs.getgrist.com`).
    pub grist_root_url: String,

    /// Document to query and write back to.
    pub grist_doc_id: String,

    /// Names bound positionally to the CLI parameters, usable in `query`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,

    /// SQL text. Rendered as a template over `parameters` before it is sent.
    pub query: String,

    /// Inline template source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Template file, relative to the configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,

    #[serde(default)]
    pub render: RenderMode,

    /// `-` for stdout, otherwise a file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// IANA zone used by the `format_timestamp` filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_back: Option<WriteBackConfig>,
}

/// How often the template is rendered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Once per row, columns bound as top-level variables.
    #[default]
    PerRow,
    /// Once for the whole result, rows bound as `rows`.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteBackConfig {
    /// Target table id.
    pub table: String,
    /// Column matching source rows to target rows. `id` is the Grist row id.
    pub key_column: String,
    /// Target column to expression evaluated against each source row.
    pub columns: BTreeMap<String, String>,
}

fn default_output() -> String {
    STDOUT.to_string()
}

impl MergeConfig {
    /// Minimal configuration; tests and callers fill in the rest.
    pub fn new(
        root_url: impl Into<String>,
        doc_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            grist_root_url: root_url.into(),
            grist_doc_id: doc_id.into(),
            parameters: Vec::new(),
            query: query.into(),
            template: None,
            template_file: None,
            render: RenderMode::default(),
            output: default_output(),
            timezone: None,
            write_back: None,
        }
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some() || self.template_file.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.grist_root_url.starts_with("http://")
            || self.grist_root_url.starts_with("https://"))
        {
            return Err(anyhow!(
                "grist_root_url must be an http(s) URL, got {:?}",
                self.grist_root_url
            ));
        }
        if self.grist_doc_id.trim().is_empty() {
            return Err(anyhow!("grist_doc_id must be non-empty"));
        }
        if self.query.trim().is_empty() {
            return Err(anyhow!("query must be non-empty"));
        }
        if self.template.is_some() && self.template_file.is_some() {
            return Err(anyhow!("template and template_file are mutually exclusive"));
        }
        if !self.has_template() && self.write_back.is_none() {
            return Err(anyhow!(
                "nothing to do: configure template, template_file or write_back"
            ));
        }
        if self.output.trim().is_empty() {
            return Err(anyhow!("output must be \"-\" or a file path"));
        }

        let mut names = HashSet::new();
        for name in &self.parameters {
            if name.trim().is_empty() {
                return Err(anyhow!("parameters must not contain empty names"));
            }
            if !names.insert(name.as_str()) {
                return Err(anyhow!("duplicate parameter {name:?}"));
            }
        }

        if let Some(tz) = &self.timezone {
            tz.parse::<chrono_tz::Tz>()
                .map_err(|err| anyhow!("unknown timezone {tz:?}: {err}"))?;
        }

        if let Some(write_back) = &self.write_back {
            write_back.validate()?;
        }
        Ok(())
    }

    /// Template source, reading `template_file` relative to `base_dir`.
    pub fn template_source(&self, base_dir: &Path) -> Result<Option<String>> {
        if let Some(inline) = &self.template {
            return Ok(Some(inline.clone()));
        }
        let Some(file) = &self.template_file else {
            return Ok(None);
        };
        let path = base_dir.join(file);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("read template {}", path.display()))?;
        Ok(Some(source))
    }
}

impl WriteBackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            bail!("write_back.table must be non-empty");
        }
        if self.key_column.trim().is_empty() {
            bail!("write_back.key_column must be non-empty");
        }
        if self.columns.is_empty() {
            bail!("write_back.columns must map at least one column");
        }
        if let Some(name) = self.columns.keys().find(|name| name.trim().is_empty()) {
            bail!("write_back.columns has an empty column name {name:?}");
        }
        Ok(())
    }
}

/// Load and validate config from a YAML file.
pub fn load_config(path: &Path) -> Result<MergeConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MergeConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MergeConfig) -> Result<()> {
    cfg.validate()?;
    let buf = serde_yaml::to_string(cfg).context("serialize config yaml")?;
    write_atomic(path, &buf)
}

/// Directory that relative paths in the config at `path` resolve against.
pub fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = config_dir(path);
    fs::create_dir_all(&parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("yml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
