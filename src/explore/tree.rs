//! Transaction search tree.
//!
//! Every node records one replayed test case: the invoked function
//! (`None` for the deployment step), the index values it wrote, the
//! memoized aggregate of everything its ancestors wrote, a prioritization
//! weight, and the set of functions still satisfiable from the node's
//! accumulated state. Nodes are arena slots addressed by `NodeId`; the
//! tree is the exploration history and never shrinks.

use crate::contract::function::FunctionId;
use crate::contract::types::IndexValueStore;
use crate::contract::Contract;
use crate::ct::ipm::{CtTestCase, RepState};
use crate::error::Result;
use crate::explore::reachability::{ReachabilityProber, StorageView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Weight granted to a step that exercised previously uncovered
/// opcodes or edges.
const NEW_COVERAGE_WEIGHT: u64 = 10;

#[derive(Debug)]
pub struct TxNode {
    pub id: NodeId,
    /// Invoked function; `None` marks the constructor/deployment step.
    pub function: Option<FunctionId>,
    pub test_case: CtTestCase,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Index values this step wrote into state variables.
    pub index_writes: IndexValueStore,
    /// Aggregate of this node's and every ancestor's index writes.
    pub inherited_index_values: IndexValueStore,
    pub new_coverage: bool,
    pub status: u64,
    pub weight: u64,
    pub depth: usize,
    /// Functions satisfiable from this node's accumulated state. Empty
    /// when the invoked function self-destructs: nothing runs afterwards.
    pub reachable: Vec<FunctionId>,
}

#[derive(Debug, Default)]
pub struct TransactionTree {
    nodes: Vec<TxNode>,
}

impl TransactionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&TxNode> {
        self.nodes.get(id.0)
    }

    /// Record one replayed step. Reachability is computed eagerly against
    /// the supplied storage view; a solver failure aborts the append, since
    /// a node with guessed reachability would poison the search.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        contract: &Contract,
        function: Option<FunctionId>,
        test_case: CtTestCase,
        parent: Option<NodeId>,
        new_coverage: bool,
        status: u64,
        storage: &StorageView,
        prober: &mut dyn ReachabilityProber,
    ) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());

        let index_writes = match function {
            Some(fid) => index_writes_of(contract, fid, &test_case),
            None => IndexValueStore::new(),
        };
        let mut inherited = index_writes.clone();
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.get(parent_id) {
                inherited.absorb(&parent_node.inherited_index_values);
            }
        }

        let weight = if status != 0 {
            let coverage_weight = if new_coverage { NEW_COVERAGE_WEIGHT } else { 0 };
            coverage_weight + status
        } else {
            0
        };
        let depth = parent
            .and_then(|p| self.get(p))
            .map(|p| p.depth + 1)
            .unwrap_or(0);

        let self_destructed = function
            .map(|fid| contract.functions[fid].is_suicidal)
            .unwrap_or(false);
        let reachable = if self_destructed {
            Vec::new()
        } else {
            prober.reachable(contract, storage)?
        };

        self.nodes.push(TxNode {
            id,
            function,
            test_case,
            parent,
            children: Vec::new(),
            index_writes,
            inherited_index_values: inherited,
            new_coverage,
            status,
            weight,
            depth,
            reachable,
        });
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(parent_id.0) {
                parent_node.children.push(id);
            }
        }
        Ok(id)
    }

    /// Functions still enterable from `node`.
    pub fn reachable_from(&self, node: NodeId) -> &[FunctionId] {
        self.get(node).map(|n| n.reachable.as_slice()).unwrap_or(&[])
    }

    /// Highest-weight node that still has somewhere to go; ties resolve to
    /// the earliest node. Purely a prioritization signal.
    pub fn best_expandable(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.reachable.is_empty())
            .max_by(|a, b| a.weight.cmp(&b.weight).then(b.id.0.cmp(&a.id.0)))
            .map(|n| n.id)
    }

    /// Snapshot of a node as a representative program state for the
    /// parameter model.
    pub fn rep_state_of(&self, node: NodeId) -> Option<RepState> {
        self.get(node).map(|n| RepState {
            node: Some(n.id),
            index_values: n.inherited_index_values.clone(),
        })
    }
}

/// Values this test case writes as state-variable indices, keyed by the
/// parameter's type and observed indirection depth.
fn index_writes_of(contract: &Contract, fid: FunctionId, tc: &CtTestCase) -> IndexValueStore {
    let mut store = IndexValueStore::new();
    let function = &contract.functions[fid];
    for (name, value) in &tc.assignments {
        let Some(param) = function.get_parameter(name) else {
            continue;
        };
        let Some(ty) = &param.ty else {
            continue;
        };
        for (level, state_vars) in &param.index_writes {
            for state_var in state_vars {
                store.record(ty, *level, state_var, value.clone());
            }
        }
    }
    store
}
