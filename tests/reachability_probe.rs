//! Satisfiability probing against concrete storage views.

use alloy::primitives::U256;
use gridfuzz::contract::metadata::ContractBundle;
use gridfuzz::contract::types::Value;
use gridfuzz::contract::Contract;
use gridfuzz::explore::reachability::{run_with_solver, ReachabilityProber, StorageView, Z3Prober};
use std::collections::BTreeMap;

const METADATA: &str = r#"{
    "name": "Vault",
    "functions": [
        {
            "name": "withdraw",
            "full_name": "withdraw(uint256)",
            "visibility": "external",
            "parameters": [{"name": "amount", "type": "uint256"}],
            "requires": [
                {
                    "code": "require(open == 1)",
                    "lhs": {"kind": "state", "name": "open"},
                    "op": "==",
                    "rhs": {"kind": "literal", "value": "1", "type": "uint256"}
                },
                {
                    "code": "require(amount <= limit)",
                    "lhs": {"kind": "param", "name": "amount"},
                    "op": "<=",
                    "rhs": {"kind": "state", "name": "limit"}
                }
            ]
        },
        {
            "name": "adjust",
            "full_name": "adjust(int8)",
            "visibility": "public",
            "parameters": [{"name": "delta", "type": "int8"}],
            "requires": [
                {
                    "code": "require(delta >= -5)",
                    "lhs": {"kind": "param", "name": "delta"},
                    "op": ">=",
                    "rhs": {"kind": "literal", "value": "-5", "type": "int8"}
                },
                {
                    "code": "require(delta <= 0)",
                    "lhs": {"kind": "param", "name": "delta"},
                    "op": "<=",
                    "rhs": {"kind": "literal", "value": "0", "type": "int8"}
                }
            ]
        }
    ],
    "state_variables": [
        {"name": "open", "type": "uint256"},
        {"name": "limit", "type": "uint256"}
    ]
}"#;

fn vault() -> Contract {
    let bundle = ContractBundle::from_json(METADATA).expect("fixture metadata parses");
    Contract::from_bundle(&bundle).expect("bundle resolves")
}

fn storage(pairs: &[(&str, u64)]) -> StorageView {
    let mut view = BTreeMap::new();
    for (name, value) in pairs {
        view.insert(name.to_string(), Value::Uint(U256::from(*value)));
    }
    view
}

#[test]
fn storage_gates_reachability() {
    let contract = vault();
    let withdraw = contract.function_by_full_name("withdraw(uint256)").unwrap();

    run_with_solver(|ctx, solver| {
        let mut prober = Z3Prober::new(ctx, solver);

        let reachable = prober
            .reachable(&contract, &storage(&[("open", 1), ("limit", 100)]))
            .expect("probe succeeds");
        assert!(
            reachable.contains(&withdraw),
            "open vault with headroom admits withdraw; got {reachable:?}"
        );

        let reachable = prober
            .reachable(&contract, &storage(&[("open", 0), ("limit", 100)]))
            .expect("probe succeeds");
        assert!(
            !reachable.contains(&withdraw),
            "require(open == 1) contradicts open = 0"
        );
    });
}

#[test]
fn signed_comparisons_use_twos_complement() {
    let contract = vault();
    let adjust = contract.function_by_full_name("adjust(int8)").unwrap();

    run_with_solver(|ctx, solver| {
        let mut prober = Z3Prober::new(ctx, solver);
        // -5 <= delta <= 0 has signed witnesses. Read unsigned, the lower
        // bound becomes astronomically large and the conjunction is
        // unsatisfiable, so this only passes with two's-complement
        // comparisons.
        let reachable = prober.reachable(&contract, &StorageView::new()).unwrap();
        assert!(reachable.contains(&adjust), "got {reachable:?}");
    });
}

#[test]
fn probe_leaves_the_assertion_stack_unchanged() {
    let contract = vault();
    run_with_solver(|ctx, solver| {
        let mut prober = Z3Prober::new(ctx, solver);
        let before = solver.get_assertions().len();
        let _ = prober
            .reachable(&contract, &storage(&[("open", 1), ("limit", 4)]))
            .unwrap();
        assert_eq!(
            solver.get_assertions().len(),
            before,
            "every per-candidate frame must be popped"
        );
    });
}
