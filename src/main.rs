//! Analysis driver: load one contract's artifact bundle, bind the graph,
//! replay an optional execution trace into the coverage ledger, emit the
//! coverage reports, probe which candidates are reachable from the
//! deployment state and build their combinatorial models.

use anyhow::{Context as _, Result};
use gridfuzz::bytecode::coverage;
use gridfuzz::contract::metadata::ContractBundle;
use gridfuzz::contract::Contract;
use gridfuzz::ct::ipm::{CtIpm, CtTestCase, RepState};
use gridfuzz::ct::oracle::{CoveringEngine, NullEngine, ProcessEngine};
use gridfuzz::explore::reachability::StorageView;
use gridfuzz::explore::tree::TransactionTree;
use gridfuzz::runtime::{
    emit_config_status, emit_coverage_status, emit_load_status, parse_runtime_args,
};
use gridfuzz::session;
use gridfuzz::utils::num::to_pc;
use std::collections::BTreeMap;

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_runtime_args()?;
    emit_config_status(&args);
    if args.explain_config {
        return Ok(());
    }

    let read = |name: &str| -> Result<String> {
        std::fs::read_to_string(args.bundle_dir.join(name))
            .with_context(|| format!("reading {} from the bundle", name))
    };

    let bundle = ContractBundle::from_json(&read("metadata.json")?)?;
    let disassembly = read("disassembly.txt")?;
    let source_map = read("srcmap.txt")?;
    let block_partition = read("blocks.txt")?;
    let mut contract = Contract::load(&bundle, &disassembly, &source_map, &block_partition)?;
    if let Ok(source) = std::fs::read_to_string(args.bundle_dir.join("source.sol")) {
        contract.attach_source(source);
    }
    emit_load_status(&contract);
    println!("{}", contract.summary());

    if let Some(trace) = &args.trace_file {
        let text = std::fs::read_to_string(trace)
            .with_context(|| format!("reading trace {}", trace.display()))?;
        let replay = replay_trace(&mut contract, &text);
        tracing::info!(
            "[OPS] Trace replayed: {} opcode marks, {} edge marks, {} first-time edges, {} repaired",
            replay.opcode_marks,
            replay.edge_marks,
            replay.first_time_edges,
            replay.repaired_edges,
        );
    }

    emit_coverage_status(&contract);
    println!("{}", coverage::functions_coverage(&contract));

    std::fs::create_dir_all(&args.work_dir)
        .with_context(|| format!("creating {}", args.work_dir.display()))?;
    let csv = coverage::csv_report(&contract);
    std::fs::write(args.work_dir.join("coverage.csv"), &csv)?;
    std::fs::write(
        args.work_dir.join("opcodes.txt"),
        coverage::opcodes_report(&contract),
    )?;
    std::fs::write(
        args.work_dir.join("edges.txt"),
        coverage::edges_report(&contract),
    )?;
    println!("{csv}");

    let engine: Box<dyn CoveringEngine> = match &args.generator_jar {
        Some(jar) => Box::new(ProcessEngine::new(
            args.java_bin.clone(),
            jar.clone(),
            args.work_dir.clone(),
        )),
        None => Box::new(NullEngine),
    };

    // Deployment snapshot: the reachability probe starts from the state
    // variables whose initial values are known.
    let storage: StorageView = contract
        .state_variables
        .iter()
        .filter_map(|(name, sv)| sv.default_value.clone().map(|value| (name.clone(), value)))
        .collect();

    session::with_session(engine, |gateways| -> Result<()> {
        let mut tree = TransactionTree::new();
        let mut prober = gateways.prober();
        let deploy = CtTestCase {
            state: None,
            assignments: BTreeMap::new(),
        };
        let root = tree.append(&contract, None, deploy, None, false, 1, &storage, &mut prober)?;

        let reachable = tree.reachable_from(root).to_vec();
        tracing::info!(
            "[OPS] {}/{} candidates reachable from the deployment state",
            reachable.len(),
            contract.fuzzing_candidates().len(),
        );
        for &id in &reachable {
            contract.functions[id].add_rep_state(root);
        }

        for id in reachable {
            let states: Vec<RepState> = contract.functions[id]
                .rep_states
                .iter()
                .filter_map(|&node| tree.rep_state_of(node))
                .collect();
            let function = &contract.functions[id];
            let ipm = CtIpm::build(function, &states, args.strength);
            let cases = ipm.test_cases(gateways.covering());
            tracing::info!(
                "[OPS] {}: {} covering test cases",
                function.full_name,
                cases.len()
            );
            for case in &cases {
                let rendered = case
                    .assignments
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{} :: {rendered}", function.full_name);
            }
        }
        Ok(())
    })?;

    Ok(())
}

#[derive(Debug, Default)]
struct ReplaySummary {
    opcode_marks: usize,
    edge_marks: usize,
    first_time_edges: usize,
    repaired_edges: usize,
}

/// Replay a textual execution trace: `pc` lines mark opcodes, `a -> b`
/// lines mark edges. Edges outside the declared set go through the repair
/// path first, mirroring how dynamic jump targets surface at runtime.
fn replay_trace(contract: &mut Contract, text: &str) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((left, right)) = line.split_once("->") {
            let (Some(a), Some(b)) = (to_pc(left), to_pc(right)) else {
                tracing::warn!("[OPS] skipping unparsable trace line `{line}`");
                continue;
            };
            let edge = (a, b);
            if !contract.edges.contains(&edge) {
                contract.add_missing_edge(edge);
                summary.repaired_edges += 1;
            }
            if contract.mark_edge_covered(edge) {
                summary.first_time_edges += 1;
            }
            summary.edge_marks += 1;
        } else if let Some(pc) = to_pc(line) {
            if contract.chain.contains(pc) {
                contract.mark_opcode_covered(pc);
                summary.opcode_marks += 1;
            } else {
                tracing::warn!("[OPS] trace pc {pc} is not in the instruction chain");
            }
        } else {
            tracing::warn!("[OPS] skipping unparsable trace line `{line}`");
        }
    }
    summary
}
