//! Coverage reporting over the contract and per-function ledgers.
//!
//! Every covered/declared opcode and edge is classified along two axes:
//! whether its block terminates in a revert, and whether the count is
//! contract-global or scoped to one function. That yields the 24-column
//! aggregate consumed by downstream tooling; reports always emit every
//! declared column, zero or not.

use crate::bytecode::chain::SourceRegion;
use crate::contract::function::FunctionId;
use crate::contract::Contract;
use std::collections::BTreeMap;

pub const STAT_KEYS: [&str; 24] = [
    "T_C_NE", "T_NE", "T_C_RE", "T_RE", "T_C_E", "T_E", "T_F_C_NE", "T_F_NE", "T_F_C_RE",
    "T_F_RE", "T_F_C_E", "T_F_E", "T_C_NO", "T_NO", "T_C_RO", "T_RO", "T_C_O", "T_O", "T_F_C_NO",
    "T_F_NO", "T_F_C_RO", "T_F_RO", "T_F_C_O", "T_F_O",
];

#[derive(Debug, Default, Clone)]
pub struct Stats(BTreeMap<&'static str, u64>);

impl Stats {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        for key in STAT_KEYS {
            map.insert(key, 0);
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    fn add(&mut self, key: &'static str, amount: u64) {
        if let Some(slot) = self.0.get_mut(key) {
            *slot += amount;
        }
    }

    fn bump(&mut self, key: &'static str) {
        self.add(key, 1);
    }
}

fn opcode_block_reverts(contract: &Contract, pc: usize) -> bool {
    contract
        .block_of(pc)
        .map(|b| b.ends_with_revert)
        .unwrap_or(false)
}

/// Per-function slice of the aggregate: only the `T_F_*` columns are
/// populated; the global columns stay zero for function rows.
pub fn function_stats(contract: &Contract, id: FunctionId) -> Stats {
    let function = &contract.functions[id];
    let mut stats = Stats::new();

    for edge in &function.covered_edges {
        if contract.edge_dest_reverts(edge) {
            stats.bump("T_F_C_RE");
        } else {
            stats.bump("T_F_C_NE");
        }
    }
    for edge in &function.edges {
        if contract.edge_dest_reverts(edge) {
            stats.bump("T_F_RE");
        } else {
            stats.bump("T_F_NE");
        }
    }
    stats.add("T_F_C_E", function.covered_edges.len() as u64);
    stats.add("T_F_E", function.edges.len() as u64);

    for &pc in &function.covered_opcodes {
        if opcode_block_reverts(contract, pc) {
            stats.bump("T_F_C_RO");
        } else {
            stats.bump("T_F_C_NO");
        }
    }
    for &pc in &function.opcodes {
        if opcode_block_reverts(contract, pc) {
            stats.bump("T_F_RO");
        } else {
            stats.bump("T_F_NO");
        }
    }
    stats.add("T_F_C_O", function.covered_opcodes.len() as u64);
    stats.add("T_F_O", function.opcodes.len() as u64);

    stats
}

/// The full 24-column aggregate: one `*Contract` row followed by one
/// `"#Contract.function"` row per declared function. The contract row also
/// absorbs the per-function sums so the function-scoped columns aggregate
/// at the top.
pub fn csv_report(contract: &Contract) -> String {
    let mut totals = Stats::new();

    for edge in &contract.covered_edges {
        if contract.edge_dest_reverts(edge) {
            totals.bump("T_C_RE");
        } else {
            totals.bump("T_C_NE");
        }
    }
    for edge in &contract.edges {
        if contract.edge_dest_reverts(edge) {
            totals.bump("T_RE");
        } else {
            totals.bump("T_NE");
        }
    }
    totals.add("T_C_E", contract.covered_edges.len() as u64);
    totals.add("T_E", contract.edges.len() as u64);

    for &pc in &contract.covered_opcodes {
        if opcode_block_reverts(contract, pc) {
            totals.bump("T_C_RO");
        } else {
            totals.bump("T_C_NO");
        }
    }
    for instruction in contract.chain.iter() {
        if opcode_block_reverts(contract, instruction.pc) {
            totals.bump("T_RO");
        } else {
            totals.bump("T_NO");
        }
    }
    totals.add("T_C_O", contract.covered_opcodes.len() as u64);
    totals.add("T_O", contract.chain.len() as u64);

    let mut function_rows = Vec::new();
    for id in 0..contract.functions.len() {
        let function = &contract.functions[id];
        if function.is_synthetic() {
            continue;
        }
        let stats = function_stats(contract, id);
        let mut row = vec![format!("\"#{}.{}\"", contract.name, function.full_name)];
        for key in STAT_KEYS {
            let value = stats.get(key);
            row.push(value.to_string());
            totals.add(key, value);
        }
        function_rows.push(row.join(", "));
    }

    let mut contract_row = vec![format!("*{}", contract.name)];
    for key in STAT_KEYS {
        contract_row.push(totals.get(key).to_string());
    }

    let mut out = Vec::with_capacity(function_rows.len() + 2);
    out.push(format!("Name, {}", STAT_KEYS.join(", ")));
    out.push(contract_row.join(", "));
    out.extend(function_rows);
    out.join("\n")
}

/// One line per instruction, `+` covered / `-` uncovered, with the owning
/// function and the first originating source line when available.
pub fn opcodes_report(contract: &Contract) -> String {
    let mut out = Vec::with_capacity(contract.chain.len());
    for instruction in contract.chain.iter() {
        let marker = if contract.covered_opcodes.contains(&instruction.pc) {
            '+'
        } else {
            '-'
        };
        let mut line = format!("{marker}{} {}", instruction.pc, instruction.mnemonic);
        if let Some(value) = instruction.push_value {
            line.push_str(&format!(" {value:#x}"));
        }
        if let Some(id) = instruction.function {
            line.push_str(&format!(" <{}>", contract.functions[id].full_name));
        }
        if let (Some(source), SourceRegion::Mapped { offset, length, .. }) =
            (contract.source_text.as_deref(), instruction.source)
        {
            if let Some(slice) = source.get(offset..offset + length) {
                if let Some(first) = slice.lines().next() {
                    line.push_str(&format!(" => \"{}\"", first.trim()));
                }
            }
        }
        out.push(line);
    }
    out.join("\n")
}

/// One line per declared edge, `+` covered / `-` uncovered, showing both
/// endpoint blocks.
pub fn edges_report(contract: &Contract) -> String {
    let mut out = Vec::with_capacity(contract.edges.len());
    for edge in &contract.edges {
        let marker = if contract.covered_edges.contains(edge) {
            '+'
        } else {
            '-'
        };
        let describe = |pc: usize| -> String {
            match contract.block_of(pc) {
                Some(block) => {
                    let op = |p: usize| {
                        contract
                            .chain
                            .get(p)
                            .map(|i| i.mnemonic.clone())
                            .unwrap_or_default()
                    };
                    format!(
                        "[{} {}, {} {}]",
                        block.entry,
                        op(block.entry),
                        block.end,
                        op(block.end)
                    )
                }
                None => format!("[{pc} ?]"),
            }
        };
        out.push(format!(
            "{marker}{} => {}",
            describe(edge.0),
            describe(edge.1)
        ));
    }
    out.join("\n")
}

/// Per-function coverage summary lines, synthetic initializers excluded.
pub fn functions_coverage(contract: &Contract) -> String {
    let mut out = Vec::new();
    for function in &contract.functions {
        if function.is_synthetic() {
            continue;
        }
        out.push(format!(
            "{} edge_cov: {} opcode_cov: {}{}",
            function.full_name,
            function.edge_coverage_line(),
            function.opcode_coverage_line(),
            if function.entered { "" } else { " (never entered)" }
        ));
    }
    out.join("\n")
}
