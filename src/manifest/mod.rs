//! # Manifest Parsing
//!
//! This module turns one manifest document into dependency declarations.
//! A manifest maps checkout paths to sources and carries its own default
//! variables:
//!
//! ```text
//! vars = {
//!   'chromium_git': 'https://chromium.googlesource.com',
//! }
//! deps = {
//!   'src/third_party/zlib': Var('chromium_git') + '/zlib.git@0123abcd',
//!   'src/third_party/android_ndk': {
//!     'url': '{chromium_git}/android_ndk.git@4567ef01',
//!     'condition': 'checkout_android',
//!   },
//! }
//! ```
//!
//! Two syntaxes are accepted: the upstream `DEPS` syntax (see
//! [`deps_syntax`]) and a YAML/JSON rendition with the same keys. Both are
//! lowered to a `serde_json::Value` and extracted by the same code.
//!
//! ## Variables
//!
//! The manifest's `vars` are merged *under* the caller's context: the
//! caller's platform selection wins on conflicts. The merged context is used
//! both for `{name}` placeholder substitution in urls and, later, for
//! condition evaluation.
//!
//! ## Failure policy
//!
//! Anything that cannot be decoded is a [`Error::MalformedManifest`]. There
//! is no partial result: a silently dropped entry would silently drop a
//! transitive source from the vendor file.

pub mod deps_syntax;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::ConditionEvaluator;
use crate::context::{VarValue, VariableContext};
use crate::error::{Error, Result};
use crate::filesystem::check_workspace_path;

/// Host serving single-object storage dependencies
const GCS_BASE_URL: &str = "https://storage.googleapis.com/";

/// The two accepted manifest syntaxes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// Upstream `name = {...}` syntax
    Deps,
    /// YAML (or JSON, which is a subset)
    Yaml,
}

impl ManifestFormat {
    /// Guesses the syntax of `text`.
    ///
    /// A document whose first statement is `identifier =` is `DEPS` syntax;
    /// everything else is handed to the YAML reader.
    pub fn detect(text: &str) -> Self {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let ident_len = line
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(line.len());
            if ident_len == 0 {
                return ManifestFormat::Yaml;
            }
            let rest = line[ident_len..].trim_start();
            return if rest.starts_with('=') && !rest.starts_with("==") {
                ManifestFormat::Deps
            } else {
                ManifestFormat::Yaml
            };
        }
        ManifestFormat::Deps
    }
}

/// Hash algorithm of a [`Digest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => f.write_str("sha1"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Content digest of an opaque storage blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
}

impl Digest {
    pub fn sha1(value: impl Into<String>) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha1,
            value: value.into(),
        }
    }

    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            value: value.into(),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Where a declared dependency comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredSource {
    /// A git repository pinned to a revision
    Git { url: String, revision: String },
    /// A single archive in external storage
    Blob { url: String, digest: Digest },
    /// A kind the vendor file cannot express (`cipd`, multi-object `gcs`)
    Unsupported { dep_type: String, reason: String },
}

impl DeclaredSource {
    /// Short human-readable form, used in conflict reports.
    pub fn describe(&self) -> String {
        match self {
            DeclaredSource::Git { url, revision } => format!("{}@{}", url, revision),
            DeclaredSource::Blob { url, digest } => format!("{} ({})", url, digest),
            DeclaredSource::Unsupported { dep_type, .. } => format!("<{}>", dep_type),
        }
    }
}

/// One `path -> source` entry of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDeclaration {
    pub path: String,
    pub source: DeclaredSource,
    pub condition: Option<String>,
}

/// The result of parsing one manifest
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    /// Declarations in lexicographic path order
    pub declarations: Vec<DependencyDeclaration>,
    /// The manifest's own `vars`
    pub variables: BTreeMap<String, VarValue>,
    /// `variables` merged under the caller's context
    pub context: VariableContext,
    /// Whether declaration paths are relative to the declaring dependency
    pub use_relative_paths: bool,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    vars: BTreeMap<String, VarValue>,
    #[serde(default)]
    deps: BTreeMap<String, Value>,
    #[serde(default)]
    use_relative_paths: bool,
}

fn default_dep_type() -> String {
    "git".to_string()
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default = "default_dep_type")]
    dep_type: String,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    objects: Vec<RawObject>,
    #[serde(default)]
    packages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    object_name: String,
    sha256sum: String,
}

/// Parses manifests, validating conditions with the given evaluator.
pub struct ManifestParser<'a> {
    evaluator: &'a dyn ConditionEvaluator,
    format: Option<ManifestFormat>,
}

impl<'a> ManifestParser<'a> {
    pub fn new(evaluator: &'a dyn ConditionEvaluator) -> Self {
        Self {
            evaluator,
            format: None,
        }
    }

    /// Forces a syntax instead of detecting it per document.
    pub fn with_format(mut self, format: ManifestFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Reads and parses the manifest at `path`.
    pub fn parse_file(&self, path: &Path, base: &VariableContext) -> Result<ParsedManifest> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::malformed(path.display().to_string(), format!("cannot read: {}", e))
        })?;
        self.parse(&path.display().to_string(), &text, base)
    }

    /// Parses manifest text. `source_name` only labels error messages.
    pub fn parse(
        &self,
        source_name: &str,
        raw: &str,
        base: &VariableContext,
    ) -> Result<ParsedManifest> {
        let format = self.format.unwrap_or_else(|| ManifestFormat::detect(raw));
        let document = match format {
            ManifestFormat::Deps => Value::Object(deps_syntax::read(source_name, raw)?),
            ManifestFormat::Yaml => serde_yaml::from_str::<Value>(raw)
                .map_err(|e| Error::malformed(source_name, e.to_string()))?,
        };
        if !document.is_object() {
            return Err(Error::malformed(
                source_name,
                "expected a mapping at the top level",
            ));
        }

        let manifest: RawManifest = serde_json::from_value(document)
            .map_err(|e| Error::malformed(source_name, e.to_string()))?;
        let context = base.overlay(&manifest.vars);

        let mut declarations = Vec::new();
        for (path, value) in &manifest.deps {
            if let Some(declaration) = self.declaration(source_name, path, value, &context)? {
                declarations.push(declaration);
            }
        }

        Ok(ParsedManifest {
            declarations,
            variables: manifest.vars,
            context,
            use_relative_paths: manifest.use_relative_paths,
        })
    }

    fn declaration(
        &self,
        source_name: &str,
        path: &str,
        value: &Value,
        context: &VariableContext,
    ) -> Result<Option<DependencyDeclaration>> {
        check_workspace_path(path)
            .map_err(|message| Error::malformed(source_name, format!("dependency path {}", message)))?;

        let entry = match value {
            Value::Null => return Ok(None),
            Value::String(url) => RawEntry {
                url: Some(url.clone()),
                dep_type: default_dep_type(),
                condition: None,
                bucket: None,
                objects: Vec::new(),
                packages: Vec::new(),
            },
            Value::Object(_) => serde_json::from_value::<RawEntry>(value.clone())
                .map_err(|e| Error::malformed(source_name, format!("{}: {}", path, e)))?,
            other => {
                return Err(Error::malformed(
                    source_name,
                    format!("{}: expected a url or a dict, found {}", path, other),
                ))
            }
        };

        if let Some(condition) = &entry.condition {
            self.evaluator.validate(condition).map_err(|e| {
                Error::malformed(source_name, format!("{}: bad condition: {}", path, e))
            })?;
        }

        let source = match entry.dep_type.as_str() {
            "git" => {
                let Some(url) = &entry.url else {
                    // `'url': None` disables an entry; leaving the key out is an error
                    if value.get("url").is_some() {
                        return Ok(None);
                    }
                    return Err(Error::malformed(
                        source_name,
                        format!("{}: git dependency without url", path),
                    ));
                };
                let url = substitute(url, context)
                    .map_err(|message| Error::malformed(source_name, format!("{}: {}", path, message)))?;
                let (repo, revision) = url
                    .rsplit_once('@')
                    .filter(|(repo, rev)| !repo.is_empty() && !rev.is_empty())
                    .ok_or_else(|| {
                        Error::malformed(
                            source_name,
                            format!("{}: '{}' is not pinned to a revision", path, url),
                        )
                    })?;
                DeclaredSource::Git {
                    url: repo.to_string(),
                    revision: revision.to_string(),
                }
            }
            "gcs" => {
                let bucket = entry.bucket.as_deref().ok_or_else(|| {
                    Error::malformed(source_name, format!("{}: gcs dependency without bucket", path))
                })?;
                match entry.objects.as_slice() {
                    [] => {
                        return Err(Error::malformed(
                            source_name,
                            format!("{}: gcs dependency without objects", path),
                        ))
                    }
                    [object] => {
                        let url = url::Url::parse(GCS_BASE_URL)?
                            .join(&format!("{}/{}", bucket, object.object_name))?;
                        DeclaredSource::Blob {
                            url: url.to_string(),
                            digest: Digest::sha256(object.sha256sum.clone()),
                        }
                    }
                    objects => DeclaredSource::Unsupported {
                        dep_type: "gcs".to_string(),
                        reason: format!("{} objects in one entry", objects.len()),
                    },
                }
            }
            "cipd" => DeclaredSource::Unsupported {
                dep_type: "cipd".to_string(),
                reason: format!("{} cipd package(s)", entry.packages.len()),
            },
            other => {
                return Err(Error::malformed(
                    source_name,
                    format!("{}: unknown dep_type '{}'", path, other),
                ))
            }
        };

        Ok(Some(DependencyDeclaration {
            path: path.to_string(),
            source,
            condition: entry.condition,
        }))
    }
}

/// Expands `{name}` placeholders from `context`. `{{` and `}}` are literal braces.
fn substitute(template: &str, context: &VariableContext) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(format!("unclosed placeholder in '{}'", template)),
                    }
                }
                let value = context
                    .get(&name)
                    .ok_or_else(|| format!("undefined variable '{}'", name))?;
                out.push_str(&value.to_string());
            }
            '}' => return Err(format!("unmatched '}}' in '{}'", template)),
            c => out.push(c),
        }
    }
    Ok(out)
}
