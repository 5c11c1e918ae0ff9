//! # Vendor File Emission
//!
//! Renders a [`Resolution`] as a declarative build input. Records are
//! visited in lexicographic path order and every byte of the output is a
//! function of the records and the header, so identical inputs give
//! identical files.
//!
//! The Nix format is an attribute set from checkout path to fixed-output
//! derivation:
//!
//! ```text
//! # GENERATED BY 'deps-vendor 120.0.6099.71' for unix
//! {fetchgit, fetchurl, runCommand}:
//! {
//!   "src/third_party/zlib"   = fetchgit { url = "https://...zlib.git"   ; rev = "..."; sha256 = "..."; };
//!   "src/third_party/node/node_modules" = runCommand "download_from_google_storage" {} ''
//!     ...
//!   '';
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::manifest::Digest;
use crate::phases::{Resolution, ResolvedSource};

/// Column the `= fetchgit` of a git line is padded to (path incl. quotes)
const PATH_COLUMN: usize = 90;
/// Column the `;` after a git url is padded to (url incl. quotes)
const URL_COLUMN: usize = 128;

/// Output syntax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Nix,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nix" => Ok(OutputFormat::Nix),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::ConfigParse {
                message: format!("unknown output format '{}'", other),
                hint: Some("use 'nix' or 'json'".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub format: OutputFormat,
    /// First-line comment (Nix only), without the leading `# `
    pub header: Option<String>,
}

/// Renders `resolution` in the requested format.
pub fn emit(resolution: &Resolution, options: &EmitOptions) -> Result<String> {
    match options.format {
        OutputFormat::Nix => Ok(emit_nix(resolution, options.header.as_deref())),
        OutputFormat::Json => emit_json(resolution),
    }
}

fn emit_nix(resolution: &Resolution, header: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        for line in header.lines() {
            let _ = writeln!(out, "# {}", line);
        }
    }
    out.push_str("{fetchgit, fetchurl, runCommand}:\n");
    out.push_str("{\n");
    for record in resolution.iter() {
        match &record.source {
            ResolvedSource::Git {
                url,
                revision,
                content_hash,
            } => {
                let _ = writeln!(
                    out,
                    "  {:<path_w$} = fetchgit {{ url = {:<url_w$}; rev = {}; sha256 = {}; }};",
                    nix_string(&record.path),
                    nix_string(url),
                    nix_string(revision),
                    nix_string(content_hash),
                    path_w = PATH_COLUMN,
                    url_w = URL_COLUMN,
                );
            }
            ResolvedSource::Blob { url, digest } => {
                out.push_str(&nix_blob(&record.path, url, digest));
            }
        }
    }
    out.push_str("}\n");
    out
}

fn nix_blob(path: &str, url: &str, digest: &Digest) -> String {
    let algorithm = digest.algorithm.to_string();
    let width = algorithm.len().max("url".len());
    format!(
        "  {path} = runCommand \"download_from_google_storage\" {{}} ''\n\
         \x20   mkdir $out\n\
         \x20   tar xf ${{fetchurl {{\n\
         \x20               {url_key:<width$} = {url};\n\
         \x20               {alg_key:<width$} = {value};\n\
         \x20           }}}} --strip-components=1 -C $out\n\
         \x20 '';\n",
        path = nix_string(path),
        url_key = "url",
        url = nix_string(url),
        alg_key = algorithm,
        value = nix_string(&digest.value),
        width = width,
    )
}

fn emit_json(resolution: &Resolution) -> Result<String> {
    let map: BTreeMap<&str, &ResolvedSource> = resolution
        .iter()
        .map(|r| (r.path.as_str(), &r.source))
        .collect();
    let mut out = serde_json::to_string_pretty(&map)?;
    out.push('\n');
    Ok(out)
}

/// Quotes `s` as a Nix double-quoted string.
pub fn nix_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::DependencyRecord;

    fn resolution(records: Vec<(&str, ResolvedSource)>) -> Resolution {
        let mut resolution = Resolution::default();
        for (path, source) in records {
            resolution.records.insert(
                path.to_string(),
                DependencyRecord {
                    path: path.to_string(),
                    source,
                },
            );
        }
        resolution
    }

    fn git(url: &str, revision: &str, hash: &str) -> ResolvedSource {
        ResolvedSource::Git {
            url: url.into(),
            revision: revision.into(),
            content_hash: hash.into(),
        }
    }

    #[test]
    fn test_nix_string_escapes() {
        assert_eq!(nix_string("plain"), "\"plain\"");
        assert_eq!(nix_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(nix_string("a\\b"), "\"a\\\\b\"");
        assert_eq!(nix_string("${x}"), "\"\\${x}\"");
        assert_eq!(nix_string("$x"), "\"$x\"");
    }

    #[test]
    fn test_nix_git_lines_are_padded_and_sorted() {
        let resolution = resolution(vec![
            ("src/b", git("https://b.git", "r2", "hash2")),
            ("src/a", git("https://a.git", "r1", "hash1")),
        ]);
        let out = emit(
            &resolution,
            &EmitOptions {
                format: OutputFormat::Nix,
                header: Some("GENERATED BY 'deps-vendor 1.0' for unix".into()),
            },
        )
        .unwrap();

        let expected = format!(
            "# GENERATED BY 'deps-vendor 1.0' for unix\n\
             {{fetchgit, fetchurl, runCommand}}:\n\
             {{\n\
             \x20 {:<90} = fetchgit {{ url = {:<128}; rev = \"r1\"; sha256 = \"hash1\"; }};\n\
             \x20 {:<90} = fetchgit {{ url = {:<128}; rev = \"r2\"; sha256 = \"hash2\"; }};\n\
             }}\n",
            "\"src/a\"", "\"https://a.git\"", "\"src/b\"", "\"https://b.git\""
        );
        assert_eq!(out, expected);

        let line = out.lines().nth(3).unwrap();
        assert_eq!(line.find(" = fetchgit"), Some(2 + 90));
    }

    #[test]
    fn test_nix_blob_template() {
        let resolution = resolution(vec![(
            "src/third_party/node/node_modules",
            ResolvedSource::Blob {
                url: "https://commondatastorage.googleapis.com/chromium-nodejs/abc".into(),
                digest: Digest::sha1("abc"),
            },
        )]);
        let out = emit(&resolution, &EmitOptions::default()).unwrap();
        let expected = "{fetchgit, fetchurl, runCommand}:\n\
{\n\
\x20 \"src/third_party/node/node_modules\" = runCommand \"download_from_google_storage\" {} ''\n\
\x20   mkdir $out\n\
\x20   tar xf ${fetchurl {\n\
\x20               url  = \"https://commondatastorage.googleapis.com/chromium-nodejs/abc\";\n\
\x20               sha1 = \"abc\";\n\
\x20           }} --strip-components=1 -C $out\n\
\x20 '';\n\
}\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_json_output() {
        let resolution = resolution(vec![
            ("src/z", git("https://z.git", "rz", "hz")),
            (
                "src/blob",
                ResolvedSource::Blob {
                    url: "https://storage.googleapis.com/bucket/obj".into(),
                    digest: Digest::sha256("d"),
                },
            ),
        ]);
        let out = emit(
            &resolution,
            &EmitOptions {
                format: OutputFormat::Json,
                header: Some("ignored".into()),
            },
        )
        .unwrap();
        insta::assert_snapshot!(out.trim_end(), @r###"
        {
          "src/blob": {
            "type": "blob",
            "url": "https://storage.googleapis.com/bucket/obj",
            "digest": {
              "algorithm": "sha256",
              "value": "d"
            }
          },
          "src/z": {
            "type": "git",
            "url": "https://z.git",
            "revision": "rz",
            "sha256": "hz"
          }
        }
        "###);
    }

    #[test]
    fn test_emission_is_deterministic() {
        let a = resolution(vec![
            ("x", git("https://x.git", "1", "h")),
            ("y", git("https://y.git", "2", "h")),
        ]);
        let b = resolution(vec![
            ("y", git("https://y.git", "2", "h")),
            ("x", git("https://x.git", "1", "h")),
        ]);
        let options = EmitOptions::default();
        assert_eq!(emit(&a, &options).unwrap(), emit(&b, &options).unwrap());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("NIX".parse::<OutputFormat>().unwrap(), OutputFormat::Nix);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("toml".parse::<OutputFormat>().is_err());
    }
}
