//! Serde model of the static-analysis frontend bundle.
//!
//! The frontend ships one JSON document per contract carrying everything the
//! core cannot recover from bytecode alone: declared functions and modifiers
//! with canonical source spans, parameter lists with observed index usage,
//! state variables, require conditions and per-function constant pools.

use crate::error::MetadataError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::External => "external",
            Self::Internal => "internal",
            Self::Private => "private",
        }
    }

    pub fn is_public_or_external(self) -> bool {
        matches!(self, Self::Public | Self::External)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration kind. `Initializer` marks the synthetic pseudo-functions some
/// frontends emit to hold state-variable initializer statements; they are
/// excluded from attribution and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    #[default]
    Function,
    Constructor,
    Fallback,
    Receive,
    Initializer,
}

/// Half-open byte range `[start, start+length)` in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub length: usize,
}

impl SourceSpan {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn contains(&self, offset: usize, length: usize) -> bool {
        self.start <= offset && offset + length <= self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

/// One side of a require comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperandDecl {
    State { name: String },
    Param { name: String },
    Literal {
        value: String,
        #[serde(rename = "type")]
        ty: String,
    },
    Sender,
}

/// A require condition normalized by the frontend to a single comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequireDecl {
    #[serde(default)]
    pub code: String,
    pub lhs: OperandDecl,
    pub op: CmpOp,
    pub rhs: OperandDecl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Indirection depth -> state variables whose indexed reads this
    /// parameter was observed to drive.
    #[serde(default)]
    pub index_reads: BTreeMap<u8, Vec<String>>,
    #[serde(default)]
    pub index_writes: BTreeMap<u8, Vec<String>>,
    /// Frontend-chosen representative values (boundary analysis output).
    #[serde(default)]
    pub base_values: Vec<String>,
}

impl ParamDecl {
    /// The implicit caller-address pseudo-parameter.
    pub fn is_sender(&self) -> bool {
        self.name == "msg.sender"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub kind: FunctionKind,
    pub visibility: Visibility,
    #[serde(default)]
    pub source_span: Option<SourceSpan>,
    #[serde(default)]
    pub parameters: Vec<ParamDecl>,
    #[serde(default)]
    pub state_variables_read: Vec<String>,
    #[serde(default)]
    pub state_variables_written: Vec<String>,
    #[serde(default)]
    pub requires: Vec<RequireDecl>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub is_suicidal: bool,
    #[serde(default)]
    pub payable: bool,
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub pure: bool,
    /// Literal pool keyed by elementary type, harvested from the
    /// function's comparisons and require conditions.
    #[serde(default)]
    pub constants: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModifierDecl {
    pub name: String,
    #[serde(default)]
    pub source_span: Option<SourceSpan>,
    #[serde(default)]
    pub state_variables_read: Vec<String>,
    #[serde(default)]
    pub state_variables_written: Vec<String>,
    #[serde(default)]
    pub requires: Vec<RequireDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateVarDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub set_by_constructor: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Top-level frontend bundle for one contract.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractBundle {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub modifiers: Vec<ModifierDecl>,
    #[serde(default)]
    pub state_variables: Vec<StateVarDecl>,
}

impl ContractBundle {
    pub fn from_json(raw: &str) -> Result<Self, MetadataError> {
        serde_json::from_str(raw).map_err(|e| MetadataError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_bundle() {
        let bundle = ContractBundle::from_json(
            r#"{
                "name": "Vault",
                "functions": [{
                    "name": "deposit",
                    "full_name": "deposit(uint256)",
                    "visibility": "public",
                    "source_span": {"start": 100, "length": 80},
                    "parameters": [{"name": "amount", "type": "uint256", "base_values": ["0", "1"]}],
                    "requires": [{
                        "code": "require(amount > 0)",
                        "lhs": {"kind": "param", "name": "amount"},
                        "op": ">",
                        "rhs": {"kind": "literal", "value": "0", "type": "uint256"}
                    }]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(bundle.name, "Vault");
        let f = &bundle.functions[0];
        assert_eq!(f.kind, FunctionKind::Function);
        assert!(f.visibility.is_public_or_external());
        assert_eq!(f.requires[0].op, CmpOp::Gt);
    }

    #[test]
    fn rejects_unknown_visibility() {
        let err = ContractBundle::from_json(
            r#"{"name": "X", "functions": [{"name": "f", "full_name": "f()", "visibility": "secret"}]}"#,
        );
        assert!(err.is_err());
    }
}
