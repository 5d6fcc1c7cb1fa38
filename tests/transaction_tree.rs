//! Transaction tree: weights, inherited index values, terminal
//! self-destruct handling and expansion ordering.

use alloy::primitives::U256;
use gridfuzz::contract::function::FunctionId;
use gridfuzz::contract::metadata::ContractBundle;
use gridfuzz::contract::types::{SolType, Value};
use gridfuzz::contract::Contract;
use gridfuzz::ct::ipm::CtTestCase;
use gridfuzz::error::SolverError;
use gridfuzz::explore::reachability::{ReachabilityProber, StorageView};
use gridfuzz::explore::tree::TransactionTree;
use std::collections::BTreeMap;

const METADATA: &str = r#"{
    "name": "Vault",
    "functions": [
        {
            "name": "deposit",
            "full_name": "deposit(uint256)",
            "visibility": "public",
            "parameters": [
                {"name": "amount", "type": "uint256",
                 "index_writes": {"0": ["balances"]}}
            ]
        },
        {
            "name": "shutdown",
            "full_name": "shutdown()",
            "visibility": "external",
            "is_suicidal": true
        }
    ],
    "state_variables": [{"name": "balances", "type": "uint256"}]
}"#;

fn vault() -> Contract {
    let bundle = ContractBundle::from_json(METADATA).expect("fixture metadata parses");
    Contract::from_bundle(&bundle).expect("bundle resolves")
}

/// Prober double: hands back a fixed answer and counts probes.
struct FixedProber {
    answer: Vec<FunctionId>,
    probes: usize,
}

impl FixedProber {
    fn new(answer: Vec<FunctionId>) -> Self {
        Self { answer, probes: 0 }
    }
}

impl ReachabilityProber for FixedProber {
    fn reachable(
        &mut self,
        _contract: &Contract,
        _storage: &StorageView,
    ) -> Result<Vec<FunctionId>, SolverError> {
        self.probes += 1;
        Ok(self.answer.clone())
    }
}

fn case(amount: u64) -> CtTestCase {
    let mut assignments = BTreeMap::new();
    assignments.insert("amount".to_string(), Value::Uint(U256::from(amount)));
    CtTestCase {
        state: None,
        assignments,
    }
}

fn deploy_case() -> CtTestCase {
    CtTestCase {
        state: None,
        assignments: BTreeMap::new(),
    }
}

#[test]
fn weight_rewards_new_coverage_on_successful_steps() {
    let contract = vault();
    let deposit = contract.function_by_full_name("deposit(uint256)").unwrap();
    let mut tree = TransactionTree::new();
    let storage = StorageView::new();
    let mut prober = FixedProber::new(vec![deposit]);

    let root = tree
        .append(&contract, None, deploy_case(), None, false, 1, &storage, &mut prober)
        .unwrap();
    assert_eq!(tree.get(root).unwrap().weight, 1, "status alone without new coverage");

    let fresh = tree
        .append(
            &contract,
            Some(deposit),
            case(7),
            Some(root),
            true,
            1,
            &storage,
            &mut prober,
        )
        .unwrap();
    assert_eq!(tree.get(fresh).unwrap().weight, 11, "10 for coverage plus status");

    let failed = tree
        .append(
            &contract,
            Some(deposit),
            case(9),
            Some(root),
            true,
            0,
            &storage,
            &mut prober,
        )
        .unwrap();
    assert_eq!(
        tree.get(failed).unwrap().weight,
        0,
        "a falsy status zeroes the weight even with new coverage"
    );
}

#[test]
fn children_inherit_ancestor_index_writes() {
    let contract = vault();
    let deposit = contract.function_by_full_name("deposit(uint256)").unwrap();
    let mut tree = TransactionTree::new();
    let storage = StorageView::new();
    let mut prober = FixedProber::new(vec![deposit]);

    let root = tree
        .append(&contract, None, deploy_case(), None, false, 1, &storage, &mut prober)
        .unwrap();
    let first = tree
        .append(&contract, Some(deposit), case(7), Some(root), true, 1, &storage, &mut prober)
        .unwrap();
    let second = tree
        .append(&contract, Some(deposit), case(9), Some(first), false, 1, &storage, &mut prober)
        .unwrap();

    let ty = SolType::Uint(256);
    let node = tree.get(second).unwrap();
    // Own write plus the ancestor's, first-seen order kept.
    assert_eq!(
        node.inherited_index_values
            .values_at(&ty, 0, "balances")
            .unwrap(),
        &[Value::Uint(U256::from(9u8)), Value::Uint(U256::from(7u8))]
    );
    assert_eq!(
        node.index_writes.values_at(&ty, 0, "balances").unwrap(),
        &[Value::Uint(U256::from(9u8))]
    );
    assert_eq!(node.depth, 2);
    assert_eq!(tree.get(root).unwrap().children, vec![first]);

    // The snapshot handed to the parameter model carries the aggregate.
    let rep = tree.rep_state_of(second).unwrap();
    assert_eq!(rep.node, Some(second));
    assert_eq!(
        rep.index_values.values_at(&ty, 0, "balances").unwrap().len(),
        2
    );
}

#[test]
fn self_destructive_step_is_terminal() {
    let contract = vault();
    let deposit = contract.function_by_full_name("deposit(uint256)").unwrap();
    let shutdown = contract.function_by_full_name("shutdown()").unwrap();
    let mut tree = TransactionTree::new();
    let storage = StorageView::new();
    let mut prober = FixedProber::new(vec![deposit, shutdown]);

    let root = tree
        .append(&contract, None, deploy_case(), None, false, 1, &storage, &mut prober)
        .unwrap();
    let probes_before = prober.probes;
    let dead = tree
        .append(
            &contract,
            Some(shutdown),
            deploy_case(),
            Some(root),
            true,
            1,
            &storage,
            &mut prober,
        )
        .unwrap();

    assert!(tree.reachable_from(dead).is_empty(), "nothing runs after SELFDESTRUCT");
    assert_eq!(prober.probes, probes_before, "the solver is never consulted");
}

#[test]
fn best_expandable_prefers_weight_then_age() {
    let contract = vault();
    let deposit = contract.function_by_full_name("deposit(uint256)").unwrap();
    let mut tree = TransactionTree::new();
    let storage = StorageView::new();
    let mut prober = FixedProber::new(vec![deposit]);

    assert!(tree.best_expandable().is_none());

    let root = tree
        .append(&contract, None, deploy_case(), None, false, 1, &storage, &mut prober)
        .unwrap();
    let heavy = tree
        .append(&contract, Some(deposit), case(1), Some(root), true, 1, &storage, &mut prober)
        .unwrap();
    let heavy_twin = tree
        .append(&contract, Some(deposit), case(2), Some(root), true, 1, &storage, &mut prober)
        .unwrap();

    assert_eq!(tree.best_expandable(), Some(heavy), "ties resolve to the older node");
    assert_ne!(tree.best_expandable(), Some(heavy_twin));
}
