//! Per-contract analysis aggregate.
//!
//! One `Contract` owns the opcode chain, the source-map attribution, the
//! block graph with its declared edge set, the coverage ledgers and the
//! resolved frontend metadata. Every contract session is an independent
//! aggregate: nothing here is shared across contracts.

pub mod function;
pub mod metadata;
pub mod types;

use crate::bytecode::cfg::{self, Block};
use crate::bytecode::chain::OpcodeChain;
use crate::bytecode::srcmap;
use crate::contract::function::{Edge, Function, FunctionId, Require};
use crate::contract::metadata::{ContractBundle, ModifierDecl, SourceSpan, StateVarDecl};
use crate::contract::types::{SolType, Value};
use crate::error::{MetadataError, Result};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct Modifier {
    pub name: String,
    pub source_span: Option<SourceSpan>,
    pub requires: Vec<Require>,
    pub state_reads: BTreeSet<String>,
    pub state_writes: BTreeSet<String>,
}

impl Modifier {
    fn resolve(decl: &ModifierDecl) -> std::result::Result<Self, MetadataError> {
        Ok(Self {
            name: decl.name.clone(),
            source_span: decl.source_span,
            requires: decl
                .requires
                .iter()
                .map(function::resolve_require)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            state_reads: decl.state_variables_read.iter().cloned().collect(),
            state_writes: decl.state_variables_written.iter().cloned().collect(),
        })
    }
}

#[derive(Debug)]
pub struct StateVariable {
    pub name: String,
    pub ty: Option<SolType>,
    pub initialized: bool,
    pub set_by_constructor: bool,
    pub default_value: Option<Value>,
}

impl StateVariable {
    fn resolve(decl: &StateVarDecl) -> std::result::Result<Self, MetadataError> {
        let ty = SolType::parse(&decl.ty).ok();
        let default_value = match (&ty, &decl.default_value) {
            (Some(ty), Some(raw)) => Some(ty.parse_value(raw)?),
            _ => None,
        };
        Ok(Self {
            name: decl.name.clone(),
            ty,
            initialized: decl.initialized,
            set_by_constructor: decl.set_by_constructor,
            default_value,
        })
    }
}

#[derive(Debug)]
pub struct Contract {
    pub name: String,
    pub functions: Vec<Function>,
    pub modifiers: BTreeMap<String, Modifier>,
    pub state_variables: BTreeMap<String, StateVariable>,

    pub chain: OpcodeChain,
    pub blocks: BTreeMap<usize, Block>,
    /// Statically declared control-flow edges, grown only through
    /// `add_missing_edge`.
    pub edges: BTreeSet<Edge>,

    pub covered_opcodes: BTreeSet<usize>,
    pub covered_edges: BTreeSet<Edge>,

    /// Original source text, kept only so reports can quote the line an
    /// instruction compiled from.
    pub source_text: Option<String>,
}

impl Contract {
    /// Resolve the frontend bundle alone; bytecode artifacts attach later.
    pub fn from_bundle(bundle: &ContractBundle) -> Result<Self> {
        let mut modifiers = BTreeMap::new();
        for decl in &bundle.modifiers {
            modifiers.insert(decl.name.clone(), Modifier::resolve(decl)?);
        }
        let mut functions = Vec::new();
        for decl in &bundle.functions {
            functions.push(Function::resolve(decl, &modifiers)?);
        }
        let mut state_variables = BTreeMap::new();
        for decl in &bundle.state_variables {
            state_variables.insert(decl.name.clone(), StateVariable::resolve(decl)?);
        }
        Ok(Self {
            name: bundle.name.clone(),
            functions,
            modifiers,
            state_variables,
            chain: OpcodeChain::default(),
            blocks: BTreeMap::new(),
            edges: BTreeSet::new(),
            covered_opcodes: BTreeSet::new(),
            covered_edges: BTreeSet::new(),
            source_text: None,
        })
    }

    pub fn attach_source(&mut self, text: impl Into<String>) {
        self.source_text = Some(text.into());
    }

    /// Full load: disassembly -> chain, source map -> attribution, block
    /// partition -> graph and declared edge set.
    pub fn load(
        bundle: &ContractBundle,
        disassembly: &str,
        source_map: &str,
        block_partition: &str,
    ) -> Result<Self> {
        let mut contract = Self::from_bundle(bundle)?;
        contract.chain = OpcodeChain::build(disassembly);
        srcmap::correlate(&mut contract, source_map)?;
        cfg::bind_blocks(&mut contract, block_partition)?;
        cfg::derive_edges(&mut contract);
        Ok(contract)
    }

    pub fn function_by_full_name(&self, full_name: &str) -> Option<FunctionId> {
        self.functions.iter().position(|f| f.full_name == full_name)
    }

    /// The declared function whose canonical source span contains
    /// `[offset, offset+length)`. Synthetic initializers never match.
    pub fn function_by_source_range(&self, offset: usize, length: usize) -> Option<FunctionId> {
        self.functions.iter().position(|f| {
            !f.is_synthetic()
                && f.source_span
                    .map(|span| span.contains(offset, length))
                    .unwrap_or(false)
        })
    }

    pub fn fuzzing_candidates(&self) -> Vec<FunctionId> {
        (0..self.functions.len())
            .filter(|&id| self.functions[id].is_fuzz_candidate())
            .collect()
    }

    /// Block owning the instruction at `pc`.
    pub fn block_of(&self, pc: usize) -> Option<&Block> {
        let entry = self.chain.get(pc)?.block?;
        self.blocks.get(&entry)
    }

    /// Whether the destination block of `edge` terminates in a revert.
    /// Instructions outside any block count as non-reverting.
    pub fn edge_dest_reverts(&self, edge: &Edge) -> bool {
        self.block_of(edge.1).map(|b| b.ends_with_revert).unwrap_or(false)
    }

    /// Idempotently mark one instruction covered, propagating to the owning
    /// function's ledger when the instruction is attributed.
    pub fn mark_opcode_covered(&mut self, pc: usize) {
        let Some(instruction) = self.chain.get(pc) else {
            debug_assert!(false, "covered pc {pc} is not in the instruction chain");
            return;
        };
        let function = instruction.function;
        self.covered_opcodes.insert(pc);
        if let Some(id) = function {
            let owner = &mut self.functions[id];
            owner.covered_opcodes.insert(pc);
            owner.entered = true;
        }
    }

    /// Mark one control-flow edge covered. Returns whether this was the
    /// first time, the signal upstream uses to detect new coverage.
    /// Covering an edge outside the declared set without going through
    /// `add_missing_edge` is a programming error.
    pub fn mark_edge_covered(&mut self, edge: Edge) -> bool {
        if self.covered_edges.contains(&edge) {
            return false;
        }
        debug_assert!(
            self.edges.contains(&edge),
            "edge ({}, {}) covered before being declared",
            edge.0,
            edge.1
        );
        self.covered_edges.insert(edge);
        if let Some(id) = self.shared_function(&edge) {
            self.functions[id].covered_edges.insert(edge);
        }
        true
    }

    /// Repair path for a dynamically discovered edge: register it with both
    /// blocks' adjacency lists and the declared edge set before any coverage
    /// marking can reference it.
    pub fn add_missing_edge(&mut self, edge: Edge) {
        if let Some(entry) = self.chain.get(edge.0).and_then(|i| i.block) {
            if let Some(block) = self.blocks.get_mut(&entry) {
                block.succs.push(edge.1);
            }
        }
        if let Some(entry) = self.chain.get(edge.1).and_then(|i| i.block) {
            if let Some(block) = self.blocks.get_mut(&entry) {
                block.preds.push(edge.0);
            }
        }
        self.edges.insert(edge);
        if let Some(id) = self.shared_function(&edge) {
            self.functions[id].edges.insert(edge);
        }
    }

    /// An edge belongs to a function only when both endpoints attribute to
    /// that same function.
    pub fn shared_function(&self, edge: &Edge) -> Option<FunctionId> {
        let left = self.chain.get(edge.0)?.function?;
        let right = self.chain.get(edge.1)?.function?;
        (left == right).then_some(left)
    }

    pub fn opcode_coverage(&self) -> f64 {
        if self.chain.is_empty() {
            return 0.0;
        }
        self.covered_opcodes.len() as f64 / self.chain.len() as f64 * 100.0
    }

    pub fn edge_coverage(&self) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        self.covered_edges.len() as f64 / self.edges.len() as f64 * 100.0
    }

    pub fn opcode_coverage_line(&self) -> String {
        format!(
            "Contract Opcode Coverage: {:.2}% ({}/{})",
            self.opcode_coverage(),
            self.covered_opcodes.len(),
            self.chain.len()
        )
    }

    pub fn edge_coverage_line(&self) -> String {
        format!(
            "Contract Edge Coverage: {:.2}% ({}/{})",
            self.edge_coverage(),
            self.covered_edges.len(),
            self.edges.len()
        )
    }

    /// Human-readable contract overview for the driver.
    pub fn summary(&self) -> String {
        let mut out = Vec::new();
        out.push(format!("Contract Name: {}", self.name));
        out.push("State Variables:".to_string());
        for sv in self.state_variables.values() {
            let ty = sv
                .ty
                .as_ref()
                .map(|t| t.canonical())
                .unwrap_or_else(|| "?".to_string());
            let default = sv
                .default_value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push(format!("\t{}({ty}): {default}", sv.name));
        }
        out.push("Functions:".to_string());
        for f in &self.functions {
            if f.is_synthetic() {
                continue;
            }
            let mut tags = vec![f.visibility.to_string()];
            if f.payable {
                tags.push("payable".to_string());
            }
            if f.view {
                tags.push("view".to_string());
            }
            if f.pure {
                tags.push("pure".to_string());
            }
            out.push(format!("\t{} [{}]", f.full_name, tags.join(", ")));
            for r in &f.requires {
                out.push(format!("\t\trequire: {}", r.code));
            }
        }
        out.join("\n")
    }
}
