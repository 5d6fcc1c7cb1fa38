//! Graph binding end to end: disassembly -> chain, source map ->
//! attribution, block partition -> blocks and declared edges.

use gridfuzz::contract::metadata::ContractBundle;
use gridfuzz::contract::Contract;

// 12 instructions; pc layout 0,2,3,4,6,8,9,10,11,12,14,16. The body of
// deposit(uint256) starts at the JUMPDEST the dispatch jump targets.
const DISASSEMBLY: &str = "PUSH1 0x03 JUMP \
    JUMPDEST PUSH1 0x0b PUSH1 0x01 JUMPI \
    JUMPDEST STOP \
    JUMPDEST PUSH1 0x00 PUSH1 0x00 REVERT";

// Entry 0 is the sentinel (dispatch push maps to no source); entry 1 puts
// the dispatch JUMP inside deposit's span; the rest inherit.
const SOURCE_MAP: &str = "0:0:-1:-;100:80:0:i;;;;;;;;;;";

const BLOCKS: &str = "\
Block 0x0
Predecessors: []
Successors: [0x3]
0x0 PUSH1 0x03
0x2 JUMP
---
Block 0x3
Predecessors: [0x0]
Successors: [0x9, 0xb]
0x3 JUMPDEST
0x4 PUSH1 0x0b
0x6 PUSH1 0x01
0x8 JUMPI
---
Block 0x9
Predecessors: [0x3]
Successors: []
0x9 JUMPDEST
0xa STOP
---
Block 0xb
Predecessors: [0x3]
Successors: []
Has unresolved jump.
0xb JUMPDEST
0xc PUSH1 0x00
0xe PUSH1 0x00
0x10 REVERT
---
";

const METADATA: &str = r#"{
    "name": "Vault",
    "functions": [
        {
            "name": "deposit",
            "full_name": "deposit(uint256)",
            "visibility": "public",
            "source_span": {"start": 100, "length": 80},
            "parameters": [
                {"name": "amount", "type": "uint256", "base_values": ["0", "1"],
                 "index_reads": {"0": ["balances"]},
                 "index_writes": {"0": ["balances"]}},
                {"name": "msg.sender", "type": "address"}
            ],
            "state_variables_written": ["balances"]
        },
        {
            "name": "shutdown",
            "full_name": "shutdown()",
            "visibility": "external",
            "source_span": {"start": 300, "length": 40},
            "is_suicidal": true
        }
    ],
    "state_variables": [
        {"name": "balances", "type": "uint256"}
    ]
}"#;

fn load_vault() -> Contract {
    let bundle = ContractBundle::from_json(METADATA).expect("fixture metadata parses");
    Contract::load(&bundle, DISASSEMBLY, SOURCE_MAP, BLOCKS).expect("fixture loads")
}

#[test]
fn address_arithmetic_over_push_widths() {
    let contract = load_vault();
    let pcs: Vec<usize> = contract.chain.iter().map(|i| i.pc).collect();
    assert_eq!(pcs, vec![0, 2, 3, 4, 6, 8, 9, 10, 11, 12, 14, 16]);
    // pc(i+1) = pc(i) + 1 + operand_width(i) across the whole chain.
    let mut expected = 0;
    for instruction in contract.chain.iter() {
        assert_eq!(instruction.pc, expected);
        expected = instruction.pc + 1 + instruction.width;
    }
}

#[test]
fn dispatch_jump_anchors_the_public_function_span() {
    let contract = load_vault();
    let deposit = contract
        .function_by_full_name("deposit(uint256)")
        .expect("deposit is declared");
    let function = &contract.functions[deposit];
    // The JUMP at pc 2 is the first mapped entry; its preceding push holds
    // the body entry, so the span starts at 3 and extends to the last
    // mapped instruction.
    assert_eq!(function.span, Some((3, 16)));
    assert_eq!(
        function.opcodes.iter().copied().collect::<Vec<_>>(),
        vec![3, 4, 6, 8, 9, 10, 11, 12, 14, 16]
    );
    // The dispatch push and jump themselves stay outside the body.
    assert_eq!(contract.chain.get(0).unwrap().function, None);
    assert_eq!(contract.chain.get(2).unwrap().function, None);
}

#[test]
fn every_instruction_has_at_most_one_owner() {
    let contract = load_vault();
    for instruction in contract.chain.iter() {
        if let Some(id) = instruction.function {
            let function = &contract.functions[id];
            assert!(
                function.opcodes.contains(&instruction.pc),
                "pc {} claims {} but is missing from its opcode set",
                instruction.pc,
                function.full_name
            );
            let (start, end) = function.span.expect("owning function has a span");
            assert!(start <= instruction.pc && instruction.pc <= end);
        }
    }
}

#[test]
fn two_successors_yield_two_edges() {
    let contract = load_vault();
    // The JUMPI block at 0x3 declares successors 0x9 and 0xb; both edges
    // originate at its final instruction.
    let from_branch: Vec<_> = contract.edges.iter().filter(|e| e.0 == 8).collect();
    assert_eq!(from_branch.len(), 2, "got edges {:?}", contract.edges);
    assert!(contract.edges.contains(&(8, 9)));
    assert!(contract.edges.contains(&(8, 11)));
    // Plus the dispatch fall-through into the body.
    assert_eq!(contract.edges.len(), 3);
}

#[test]
fn revert_termination_is_derived_per_block() {
    let contract = load_vault();
    assert!(contract.blocks[&11].ends_with_revert);
    assert!(!contract.blocks[&3].ends_with_revert);
    assert!(contract.edge_dest_reverts(&(8, 11)));
    assert!(!contract.edge_dest_reverts(&(8, 9)));
    assert!(contract.blocks[&11].unresolved_jump);
    assert!(!contract.blocks[&9].unresolved_jump);
}

#[test]
fn edges_belong_to_a_function_only_with_both_endpoints_inside() {
    let contract = load_vault();
    let deposit = contract.function_by_full_name("deposit(uint256)").unwrap();
    let function = &contract.functions[deposit];
    assert!(function.edges.contains(&(8, 9)));
    assert!(function.edges.contains(&(8, 11)));
    // (2, 3) crosses the dispatch boundary: source is unattributed.
    assert!(!function.edges.contains(&(2, 3)));
    assert_eq!(contract.shared_function(&(2, 3)), None);
}

#[test]
fn bogus_block_final_address_degrades_to_last_member() {
    let bundle = ContractBundle::from_json(METADATA).unwrap();
    // Same partition, but the branch block claims a final instruction at an
    // address the chain does not know.
    let patched = BLOCKS.replace("0x8 JUMPI", "0x8 JUMPI\n0x99 INVALID");
    let contract =
        Contract::load(&bundle, DISASSEMBLY, SOURCE_MAP, &patched).expect("fallback binds");
    assert_eq!(contract.blocks[&3].end, 8, "end degrades to the last bound member");
    assert!(contract.edges.contains(&(8, 9)));
}

#[test]
fn unknown_successor_address_is_fatal() {
    let bundle = ContractBundle::from_json(METADATA).unwrap();
    let patched = BLOCKS.replace("Successors: [0x9, 0xb]", "Successors: [0x9, 0x77]");
    let err = Contract::load(&bundle, DISASSEMBLY, SOURCE_MAP, &patched);
    assert!(err.is_err(), "a successor outside the chain must not bind");
}
