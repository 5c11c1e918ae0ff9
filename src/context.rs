//! Variable contexts for condition evaluation
//!
//! A [`VariableContext`] is built once per run from the selected target
//! platforms and never mutated afterwards. Manifests carry their own `vars`;
//! those are layered *under* the base context with [`VariableContext::overlay`],
//! so an explicit platform selection always wins over a manifest default.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating systems that have a `checkout_<os>` flag, paired with the
/// target name that enables them.
const OS_FLAGS: &[(&str, &str)] = &[
    ("checkout_android", "android"),
    ("checkout_chromeos", "chromeos"),
    ("checkout_fuchsia", "fuchsia"),
    ("checkout_ios", "ios"),
    ("checkout_linux", "unix"),
    ("checkout_mac", "mac"),
    ("checkout_win", "win"),
];

const CPU_FLAGS: &[(&str, &str)] = &[
    ("checkout_arm", "arm"),
    ("checkout_arm64", "arm64"),
    ("checkout_x86", "x86"),
    ("checkout_mips", "mips"),
    ("checkout_mips64", "mips64"),
    ("checkout_ppc", "ppc"),
    ("checkout_s390", "s390"),
    ("checkout_x64", "x64"),
];

/// A single variable value. Manifests only ever bind booleans and strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Str(String),
}

impl fmt::Display for VarValue {
    /// Renders the way upstream string formatting does (`True`/`False`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(true) => f.write_str("True"),
            VarValue::Bool(false) => f.write_str("False"),
            VarValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        VarValue::Bool(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::Str(value.to_string())
    }
}

impl VarValue {
    /// Parses a `--var NAME=VALUE` right-hand side. `True`/`False` (any case)
    /// become booleans, anything else stays a string.
    pub fn parse_cli(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "true" => VarValue::Bool(true),
            "false" => VarValue::Bool(false),
            _ => VarValue::Str(raw.to_string()),
        }
    }
}

/// The platforms a vendor file is generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSelection {
    /// Target operating systems (`unix`, `mac`, `win`, `android`, ...)
    pub target_os: Vec<String>,
    /// Target CPUs (`x64`, `arm64`, ...)
    pub target_cpu: Vec<String>,
    /// Value of the `host_os` variable
    pub host_os: String,
    /// Value of the `host_cpu` variable
    pub host_cpu: String,
}

impl Default for TargetSelection {
    fn default() -> Self {
        Self {
            target_os: vec!["unix".to_string()],
            target_cpu: Vec::new(),
            host_os: "linux".to_string(),
            host_cpu: "x64".to_string(),
        }
    }
}

/// Immutable mapping of variable name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableContext {
    vars: BTreeMap<String, VarValue>,
}

impl VariableContext {
    /// Creates a context holding exactly `vars`.
    pub fn new(vars: BTreeMap<String, VarValue>) -> Self {
        Self { vars }
    }

    /// Builds the builtin variables for a target selection.
    pub fn from_targets(targets: &TargetSelection) -> Self {
        let mut vars = BTreeMap::new();
        for (flag, os) in OS_FLAGS {
            let enabled = targets.target_os.iter().any(|t| t == os);
            vars.insert(flag.to_string(), VarValue::Bool(enabled));
        }
        for (flag, cpu) in CPU_FLAGS {
            let enabled = targets.target_cpu.iter().any(|t| t == cpu);
            vars.insert(flag.to_string(), VarValue::Bool(enabled));
        }
        vars.insert(
            "host_os".to_string(),
            VarValue::Str(targets.host_os.clone()),
        );
        vars.insert(
            "host_cpu".to_string(),
            VarValue::Str(targets.host_cpu.clone()),
        );
        Self { vars }
    }

    /// Returns a copy of this context with `overrides` applied on top.
    ///
    /// Used once while building the base context, for user supplied `--var`
    /// values, which must beat both builtins and manifest defaults.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, VarValue>) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    /// Merges manifest-local variables under this context.
    ///
    /// Keys present in `self` keep their value; `locals` only fill gaps.
    pub fn overlay(&self, locals: &BTreeMap<String, VarValue>) -> Self {
        let mut vars = locals.clone();
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarValue)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
