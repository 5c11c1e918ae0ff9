//! # deps-vendor
//!
//! This library resolves a recursively defined dependency manifest (a
//! gclient-style `DEPS` tree) into one flat, pinned, deterministic
//! dependency set and renders it as a build-system input. It powers the
//! `deps-vendor` command-line tool but can be embedded directly; every
//! collaborator that touches the outside world is a trait.
//!
//! ## Quick Example
//!
//! ```
//! use deps_vendor::condition::{ConditionEvaluator, GclientConditions};
//! use deps_vendor::context::{TargetSelection, VariableContext};
//! use deps_vendor::manifest::ManifestParser;
//!
//! let context = VariableContext::from_targets(&TargetSelection::default());
//! let manifest = ManifestParser::new(&GclientConditions)
//!     .parse(
//!         "DEPS",
//!         "deps = { 'src/third_party/zlib': {
//!             'url': 'https://example.com/zlib.git@0123abcd',
//!             'condition': 'checkout_linux',
//!         } }",
//!         &context,
//!     )
//!     .unwrap();
//!
//! let zlib = &manifest.declarations[0];
//! assert_eq!(zlib.path, "src/third_party/zlib");
//! let condition = zlib.condition.as_deref().unwrap();
//! assert!(GclientConditions.evaluate(condition, &manifest.context).unwrap());
//! ```
//!
//! ## Core Concepts
//!
//! - **Variables (`context`)**: the immutable variable context built from
//!   the target platform selection.
//! - **Conditions (`condition`)**: the pluggable evaluator for the boolean
//!   expressions that gate declarations.
//! - **Manifests (`manifest`)**: decoding one manifest into declarations.
//! - **Fetching (`fetcher`, `git`, `cache`)**: pinned revisions are fetched
//!   at most once and kept in a content cache shared across runs.
//! - **Phases (`phases`)**: the fixpoint resolution loop and its helpers.
//! - **Emission (`emit`)**: the deterministic Nix or JSON rendering.
//!
//! ## Execution Flow
//!
//! The main entry point is `phases::orchestrator`:
//!
//! 1.  **Bootstrap**: Optionally fetch the root checkout.
//! 2.  **Discovery**: Parse the root manifest and walk nested manifests pass
//!     by pass, fetching each pass's new revisions in parallel.
//! 3.  **Sidecars**: Append archives named by `.tar.gz.sha1` files.
//! 4.  **Emission**: Render the records in path order.

pub mod cache;
pub mod cancel;
pub mod condition;
#[cfg(test)]
mod condition_proptest;
pub mod config;
pub mod context;
pub mod defaults;
pub mod emit;
pub mod error;
pub mod fetcher;
pub mod filesystem;
pub mod git;
pub mod manifest;
pub mod output;
pub mod phases;
pub mod suggestions;
