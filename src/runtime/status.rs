use crate::contract::Contract;
use crate::runtime::RuntimeArgs;

pub fn emit_config_status(args: &RuntimeArgs) {
    tracing::info!(
        "[OPS] Configuration resolved: bundle={} trace={} generator={} strength={} work_dir={}",
        args.bundle_dir.display(),
        args.trace_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string()),
        args.generator_jar
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none (generation degrades to empty rounds)".to_string()),
        args.strength,
        args.work_dir.display(),
    );
}

pub fn emit_load_status(contract: &Contract) {
    tracing::info!(
        "[OPS] Loaded {}: {} instructions, {} blocks, {} edges, {} functions ({} candidates)",
        contract.name,
        contract.chain.len(),
        contract.blocks.len(),
        contract.edges.len(),
        contract.functions.len(),
        contract.fuzzing_candidates().len(),
    );
    if contract.chain.has_selfdestruct {
        tracing::warn!("[OPS] {} contains SELFDESTRUCT", contract.name);
    }
}

pub fn emit_coverage_status(contract: &Contract) {
    tracing::info!("[OPS] {}", contract.opcode_coverage_line());
    tracing::info!("[OPS] {}", contract.edge_coverage_line());
}
