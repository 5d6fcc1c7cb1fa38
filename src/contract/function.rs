use crate::contract::metadata::{
    CmpOp, FunctionDecl, FunctionKind, OperandDecl, ParamDecl, RequireDecl, SourceSpan, Visibility,
};
use crate::contract::types::{SolType, Value};
use crate::error::MetadataError;
use crate::explore::tree::NodeId;
use std::collections::{BTreeMap, BTreeSet};

pub type FunctionId = usize;

/// Control-flow transfer between the final instruction of one block and the
/// entry instruction of another, identified by their program counters.
pub type Edge = (usize, usize);

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    /// Resolved elementary type; `None` for compound types, which take no
    /// part in representative-value enrichment.
    pub ty: Option<SolType>,
    /// Ordered, deduplicated static representative values.
    pub base_values: Vec<Value>,
    pub index_reads: BTreeMap<u8, BTreeSet<String>>,
    pub index_writes: BTreeMap<u8, BTreeSet<String>>,
}

impl Parameter {
    pub fn is_sender(&self) -> bool {
        self.name == "msg.sender"
    }

    pub fn used_as_index(&self) -> bool {
        !self.index_reads.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    State(String),
    Param(String),
    Literal(Value, SolType),
    Sender,
}

/// A require condition, normalized to one comparison by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub code: String,
    pub lhs: Operand,
    pub op: CmpOp,
    pub rhs: Operand,
}

pub(crate) fn resolve_operand(decl: &OperandDecl) -> Result<Operand, MetadataError> {
    Ok(match decl {
        OperandDecl::State { name } => Operand::State(name.clone()),
        OperandDecl::Param { name } => Operand::Param(name.clone()),
        OperandDecl::Literal { value, ty } => {
            let ty = SolType::parse(ty)?;
            let parsed = ty.parse_value(value)?;
            Operand::Literal(parsed, ty)
        }
        OperandDecl::Sender => Operand::Sender,
    })
}

pub(crate) fn resolve_require(decl: &RequireDecl) -> Result<Require, MetadataError> {
    Ok(Require {
        code: decl.code.clone(),
        lhs: resolve_operand(&decl.lhs)?,
        op: decl.op,
        rhs: resolve_operand(&decl.rhs)?,
    })
}

/// Runtime function object: metadata resolved into typed form, plus the
/// bytecode ownership and coverage state accumulated during analysis.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub full_name: String,
    pub kind: FunctionKind,
    pub visibility: Visibility,
    pub source_span: Option<SourceSpan>,
    pub payable: bool,
    pub view: bool,
    pub pure: bool,
    pub is_suicidal: bool,
    pub params: Vec<Parameter>,
    pub requires: Vec<Require>,
    pub state_reads: BTreeSet<String>,
    pub state_writes: BTreeSet<String>,

    /// Minimal-maximal pc span settled by source-map correlation.
    pub span: Option<(usize, usize)>,
    pub opcodes: BTreeSet<usize>,
    pub covered_opcodes: BTreeSet<usize>,
    pub blocks: BTreeSet<usize>,
    pub edges: BTreeSet<Edge>,
    pub covered_edges: BTreeSet<Edge>,

    /// Representative program states observed for this function, in
    /// discovery order.
    pub rep_states: Vec<NodeId>,
    /// Whether any replayed execution reached an instruction of this
    /// function.
    pub entered: bool,
}

impl Function {
    pub(crate) fn resolve(
        decl: &FunctionDecl,
        modifiers: &BTreeMap<String, super::Modifier>,
    ) -> Result<Self, MetadataError> {
        let mut requires = decl
            .requires
            .iter()
            .map(resolve_require)
            .collect::<Result<Vec<_>, _>>()?;
        let mut state_reads: BTreeSet<String> =
            decl.state_variables_read.iter().cloned().collect();
        let mut state_writes: BTreeSet<String> =
            decl.state_variables_written.iter().cloned().collect();

        // Modifier requires and touched state variables count as the
        // function's own: the modifier body executes inside its frame.
        for modifier_name in &decl.modifiers {
            let modifier = modifiers
                .get(modifier_name)
                .ok_or_else(|| MetadataError::UnknownModifier(modifier_name.clone()))?;
            for require in &modifier.requires {
                if !requires.contains(require) {
                    requires.push(require.clone());
                }
            }
            state_reads.extend(modifier.state_reads.iter().cloned());
            state_writes.extend(modifier.state_writes.iter().cloned());
        }

        let params = decl
            .parameters
            .iter()
            .map(|p| resolve_parameter(p, decl))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: decl.name.clone(),
            full_name: decl.full_name.clone(),
            kind: decl.kind,
            visibility: decl.visibility,
            source_span: decl.source_span,
            payable: decl.payable,
            view: decl.view,
            pure: decl.pure,
            is_suicidal: decl.is_suicidal,
            params,
            requires,
            state_reads,
            state_writes,
            span: None,
            opcodes: BTreeSet::new(),
            covered_opcodes: BTreeSet::new(),
            blocks: BTreeSet::new(),
            edges: BTreeSet::new(),
            covered_edges: BTreeSet::new(),
            rep_states: Vec::new(),
            entered: false,
        })
    }

    /// Synthetic initializer pseudo-functions never take part in attribution
    /// or reporting.
    pub fn is_synthetic(&self) -> bool {
        self.kind == FunctionKind::Initializer
    }

    pub fn is_fuzz_candidate(&self) -> bool {
        self.visibility.is_public_or_external()
            && !matches!(self.kind, FunctionKind::Constructor | FunctionKind::Initializer)
    }

    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn add_rep_state(&mut self, node: NodeId) {
        if !self.rep_states.contains(&node) {
            self.rep_states.push(node);
        }
    }

    /// Opcode coverage percentage. A function with no attributed opcodes is
    /// vacuously fully covered.
    pub fn opcode_coverage(&self) -> f64 {
        if self.opcodes.is_empty() {
            return 100.0;
        }
        self.covered_opcodes.len() as f64 / self.opcodes.len() as f64 * 100.0
    }

    /// Edge coverage percentage, vacuously 100 with no discovered edges.
    pub fn edge_coverage(&self) -> f64 {
        if self.edges.is_empty() {
            return 100.0;
        }
        self.covered_edges.len() as f64 / self.edges.len() as f64 * 100.0
    }

    pub fn opcode_coverage_line(&self) -> String {
        format!(
            "{:.2}% ({}/{})",
            self.opcode_coverage(),
            self.covered_opcodes.len(),
            self.opcodes.len()
        )
    }

    pub fn edge_coverage_line(&self) -> String {
        format!(
            "{:.2}% ({}/{})",
            self.edge_coverage(),
            self.covered_edges.len(),
            self.edges.len()
        )
    }
}

fn resolve_parameter(decl: &ParamDecl, function: &FunctionDecl) -> Result<Parameter, MetadataError> {
    let ty = SolType::parse(&decl.ty).ok();

    let mut base_values = Vec::new();
    if let Some(ty) = &ty {
        for raw in &decl.base_values {
            let value = ty.parse_value(raw)?;
            if !base_values.contains(&value) {
                base_values.push(value);
            }
        }
        // Constant-pool enrichment: literals of the same type family,
        // numeric ones clamped to the parameter's representable range.
        // The caller pseudo-parameter keeps only frontend-chosen values.
        if !decl.is_sender() {
            for (pool_ty, literals) in &function.constants {
                let Ok(pool_ty) = SolType::parse(pool_ty) else {
                    continue;
                };
                if pool_ty.family() != ty.family() {
                    continue;
                }
                for raw in literals {
                    let Ok(value) = pool_ty.parse_value(raw) else {
                        continue;
                    };
                    if ty.is_numeric() && !ty.bounds_contain(&value) {
                        continue;
                    }
                    if !base_values.contains(&value) {
                        base_values.push(value);
                    }
                }
            }
        }
    }

    let collect = |levels: &BTreeMap<u8, Vec<String>>| {
        levels
            .iter()
            .map(|(level, vars)| (*level, vars.iter().cloned().collect::<BTreeSet<_>>()))
            .collect::<BTreeMap<_, _>>()
    };

    Ok(Parameter {
        name: decl.name.clone(),
        ty,
        base_values,
        index_reads: collect(&decl.index_reads),
        index_writes: collect(&decl.index_writes),
    })
}
