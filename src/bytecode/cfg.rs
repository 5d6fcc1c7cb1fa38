//! Binding of the externally computed basic-block partition.
//!
//! The partition arrives as text: a `Block <hex pc>` marker, a
//! `Predecessors:` line, a `Successors:` line, an optional
//! `Has unresolved jump.` marker, the member instruction lines, and a
//! `---` separator. Adjacency is expressed at instruction granularity:
//! predecessor/successor addresses are block-entry pcs, and a derived edge
//! runs from one block's final instruction to the next block's entry.

use crate::contract::Contract;
use crate::error::CfgError;
use crate::utils::num::to_pc;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Block {
    /// Entry pc; also the block's identity.
    pub entry: usize,
    /// Pc of the block-final instruction.
    pub end: usize,
    pub preds: Vec<usize>,
    pub succs: Vec<usize>,
    /// Member pcs in order, restricted to addresses the chain knows.
    pub members: Vec<usize>,
    pub unresolved_jump: bool,
    pub ends_with_revert: bool,
}

fn parse_pc_list(line: &str, prefix: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(prefix)?.trim();
    let rest = rest.strip_prefix('[').unwrap_or(rest);
    let rest = rest.strip_suffix(']').unwrap_or(rest);
    Some(
        rest.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    )
}

/// Instantiate blocks from the partition text and bind member instructions.
pub fn bind_blocks(contract: &mut Contract, text: &str) -> Result<(), CfgError> {
    let lines: Vec<&str> = text.trim().lines().map(str::trim).collect();
    let mut blocks: BTreeMap<usize, Block> = BTreeMap::new();
    let mut current: Option<Block> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(rest) = line.strip_prefix("Block") {
            let entry = to_pc(rest.trim()).ok_or(CfgError::MalformedRecord {
                line: i + 1,
                reason: format!("unparsable block address in `{line}`"),
            })?;
            if !contract.chain.contains(entry) {
                return Err(CfgError::UnknownEntry { pc: entry });
            }
            current = Some(Block {
                entry,
                end: entry,
                preds: Vec::new(),
                succs: Vec::new(),
                members: Vec::new(),
                unresolved_jump: false,
                ends_with_revert: false,
            });
        } else if line.starts_with("Predecessors") {
            let block = current.as_mut().ok_or(CfgError::MalformedRecord {
                line: i + 1,
                reason: "predecessor list outside a block record".to_string(),
            })?;
            for token in parse_pc_list(line, "Predecessors:").unwrap_or_default() {
                let pc = to_pc(&token).ok_or(CfgError::MalformedRecord {
                    line: i + 1,
                    reason: format!("unparsable predecessor `{token}`"),
                })?;
                if !contract.chain.contains(pc) {
                    return Err(CfgError::UnknownNeighbor {
                        block: block.entry,
                        role: "predecessor",
                        pc,
                    });
                }
                block.preds.push(pc);
            }
        } else if line.starts_with("Successors") {
            let mut block = current.take().ok_or(CfgError::MalformedRecord {
                line: i + 1,
                reason: "successor list outside a block record".to_string(),
            })?;
            for token in parse_pc_list(line, "Successors:").unwrap_or_default() {
                let pc = to_pc(&token).ok_or(CfgError::MalformedRecord {
                    line: i + 1,
                    reason: format!("unparsable successor `{token}`"),
                })?;
                if !contract.chain.contains(pc) {
                    return Err(CfgError::UnknownNeighbor {
                        block: block.entry,
                        role: "successor",
                        pc,
                    });
                }
                block.succs.push(pc);
            }

            i += 1;
            if lines.get(i).is_some_and(|l| l.starts_with("Has unresolved jump")) {
                block.unresolved_jump = true;
                i += 1;
            }

            // Member lines run until the separator. Addresses the chain does
            // not know are skipped: the external analysis occasionally
            // decodes data as code.
            let mut last_line_pc = None;
            while i < lines.len() && !lines[i].starts_with("---") {
                let token = lines[i].split_whitespace().next().unwrap_or_default();
                let pc = to_pc(token).ok_or(CfgError::MalformedRecord {
                    line: i + 1,
                    reason: format!("unparsable member line `{}`", lines[i]),
                })?;
                last_line_pc = Some(pc);
                if contract.chain.contains(pc) {
                    block.members.push(pc);
                }
                i += 1;
            }

            block.end = match last_line_pc {
                Some(pc) if contract.chain.contains(pc) => pc,
                Some(pc) => {
                    // Stated end is bogus; degrade to the last bound member.
                    let fallback =
                        block.members.last().copied().unwrap_or(block.entry);
                    eprintln!(
                        "[WARN] block {:#x}: final address {:#x} unknown, using {:#x}",
                        block.entry, pc, fallback
                    );
                    fallback
                }
                None => block.entry,
            };
            block.ends_with_revert = contract
                .chain
                .get(block.end)
                .is_some_and(|instr| instr.mnemonic == "REVERT");

            let entry = block.entry;
            if let Some(instruction) = contract.chain.get_mut(entry) {
                instruction.block = Some(entry);
            }
            for member in block.members.clone() {
                if let Some(instruction) = contract.chain.get_mut(member) {
                    instruction.block = Some(entry);
                }
            }
            blocks.insert(entry, block);
        }
        i += 1;
    }

    contract.blocks = blocks;
    Ok(())
}

/// Derive the declared edge set from every block's final instruction and
/// successor list, and bind blocks and edges to functions where both
/// endpoints attribute to the same one.
pub fn derive_edges(contract: &mut Contract) {
    let edges: Vec<(usize, usize)> = contract
        .blocks
        .values()
        .flat_map(|block| block.succs.iter().map(move |&succ| (block.end, succ)))
        .collect();

    for (entry, start_fn, end_fn) in contract
        .blocks
        .values()
        .map(|block| {
            (
                block.entry,
                contract.chain.get(block.entry).and_then(|i| i.function),
                contract.chain.get(block.end).and_then(|i| i.function),
            )
        })
        .collect::<Vec<_>>()
    {
        if let (Some(a), Some(b)) = (start_fn, end_fn) {
            if a == b {
                contract.functions[a].blocks.insert(entry);
            }
        }
    }

    for edge in edges {
        contract.edges.insert(edge);
        if let Some(id) = contract.shared_function(&edge) {
            contract.functions[id].edges.insert(edge);
        }
    }
}
