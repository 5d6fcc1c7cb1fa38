//! Compressed source-map decoding and function attribution.
//!
//! Each `;`-separated segment describes one instruction as
//! `offset:length:file:jump`, with blank fields inheriting the previous
//! segment's value. The correlator walks segments and instructions in
//! lock-step, assembling per-function pc spans from three recognition
//! shapes: the unnamed dispatch/fallback region (anchored by scanning back
//! to the nearest block entry), externally visible functions (anchored by
//! the pushed target of the dispatch jump), and internal functions
//! (anchored by their first mapped instruction).
//!
//! Attribution failures here are fatal on purpose: coverage and the
//! parameter model both key off `instruction.function`.

use crate::bytecode::chain::SourceRegion;
use crate::contract::metadata::FunctionKind;
use crate::contract::Contract;
use crate::error::CorrelationError;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    In,
    Out,
    Regular,
}

impl JumpKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "i" => Self::In,
            "o" => Self::Out,
            _ => Self::Regular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub offset: i64,
    pub length: i64,
    pub file: i64,
    pub jump: JumpKind,
}

/// Decode the delta/omission-compressed map into one entry per instruction.
pub fn parse_source_map(raw: &str) -> Result<Vec<SourceMapEntry>, CorrelationError> {
    let mut entries = Vec::new();
    let mut last = SourceMapEntry {
        offset: 0,
        length: 0,
        file: 0,
        jump: JumpKind::Regular,
    };
    for (index, segment) in raw.trim().split(';').enumerate() {
        for (position, field) in segment.split(':').enumerate() {
            if field.is_empty() {
                continue;
            }
            let malformed = || CorrelationError::MalformedEntry {
                index,
                raw: segment.to_string(),
            };
            match position {
                0 => last.offset = field.parse().map_err(|_| malformed())?,
                1 => last.length = field.parse().map_err(|_| malformed())?,
                2 => last.file = field.parse().map_err(|_| malformed())?,
                3 => last.jump = JumpKind::parse(field),
                // Newer compilers append fields this correlator does not
                // consume (e.g. modifier depth).
                _ => {}
            }
        }
        entries.push(last);
    }
    Ok(entries)
}

/// Walk map entries and instructions in lock-step, then stamp every
/// instruction inside each finalized span with its owning function.
pub fn correlate(contract: &mut Contract, raw: &str) -> Result<(), CorrelationError> {
    let entries = parse_source_map(raw)?;
    if entries.len() > contract.chain.len() {
        return Err(CorrelationError::EntryCountMismatch {
            entries: entries.len(),
            instructions: contract.chain.len(),
        });
    }

    // Function id -> inclusive pc span, grown entry by entry.
    let mut spans: BTreeMap<usize, (usize, usize)> = BTreeMap::new();

    for (slot, entry) in entries.iter().enumerate() {
        let (pc, is_jump) = {
            let instruction = contract
                .chain
                .at_slot(slot)
                .expect("entry count checked against chain length");
            (instruction.pc, instruction.is_jump())
        };

        if entry.file < 0 {
            if let Some(instruction) = contract.chain.get_mut(pc) {
                instruction.source = SourceRegion::Unmapped;
            }
            continue;
        }
        let offset = entry.offset.max(0) as usize;
        let length = entry.length.max(0) as usize;
        let mapped = SourceRegion::Mapped {
            offset,
            length,
            file: entry.file as u32,
        };

        let Some(id) = contract.function_by_source_range(offset, length) else {
            // Mapped, but inside no declared function body (file headers,
            // contract-level statements). Stays function-free.
            if let Some(instruction) = contract.chain.get_mut(pc) {
                instruction.source = mapped;
            }
            continue;
        };

        let function = &contract.functions[id];
        match (function.kind, function.visibility) {
            (FunctionKind::Fallback, _) => match spans.entry(id) {
                Entry::Occupied(mut span) => span.get_mut().1 = pc + 1,
                Entry::Vacant(span) => {
                    // The dispatch region has no named anchor; its first
                    // instruction is the nearest preceding block entry.
                    let mut cursor = slot;
                    loop {
                        let candidate = contract
                            .chain
                            .at_slot(cursor)
                            .expect("cursor stays within the chain");
                        if candidate.is_jumpdest() {
                            span.insert((candidate.pc, pc));
                            break;
                        }
                        cursor = cursor
                            .checked_sub(1)
                            .ok_or(CorrelationError::DispatchRegionUnanchored { pc })?;
                    }
                }
            },
            (FunctionKind::Constructor | FunctionKind::Initializer, _) => {
                return Err(CorrelationError::UnhandledShape {
                    pc,
                    function: function.full_name.clone(),
                    visibility: function.visibility.to_string(),
                });
            }
            (_, visibility) if visibility.is_public_or_external() => {
                match spans.entry(id) {
                    Entry::Occupied(mut span) => span.get_mut().1 = pc,
                    Entry::Vacant(span) => {
                        if is_jump {
                            // Dispatch-table entry: the preceding push holds
                            // the body's entry pc.
                            let target = contract
                                .chain
                                .prev(pc)
                                .and_then(|prev| prev.push_value)
                                .and_then(|v| usize::try_from(v).ok())
                                .ok_or_else(|| CorrelationError::MissingJumpTarget {
                                    pc,
                                    function: contract.functions[id].full_name.clone(),
                                })?;
                            span.insert((target, target));
                        }
                    }
                }
            }
            _ => match spans.entry(id) {
                Entry::Occupied(mut span) => span.get_mut().1 = pc,
                Entry::Vacant(span) => {
                    span.insert((pc, pc));
                }
            },
        }

        if let Some(instruction) = contract.chain.get_mut(pc) {
            instruction.source = mapped;
        }
    }

    // Instructions past the map's end carry no attribution.
    for instruction in contract.chain.iter_mut() {
        if instruction.source == SourceRegion::Pending {
            instruction.source = SourceRegion::Unmapped;
        }
    }

    // Second pass: stamp ownership across each finalized span, catching the
    // helper instructions that lack their own direct mapping to the
    // function's source range.
    let Contract {
        chain, functions, ..
    } = contract;
    for (id, (start, end)) in spans {
        let function = &mut functions[id];
        function.span = Some((start, end));
        let mut slot =
            chain
                .slot_of(start)
                .ok_or_else(|| CorrelationError::SpanOutsideChain {
                    pc: start,
                    function: function.full_name.clone(),
                })?;
        while let Some(instruction) = chain.at_slot_mut(slot) {
            if instruction.pc > end {
                break;
            }
            if instruction.source.is_mapped() {
                instruction.function = Some(id);
                function.opcodes.insert(instruction.pc);
            }
            slot += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_forward_inherits_blank_fields() {
        let entries = parse_source_map("10:5:0:-;;:8;20::1:i").unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1], entries[0]);
        assert_eq!(entries[2].offset, 10);
        assert_eq!(entries[2].length, 8);
        assert_eq!(entries[3].offset, 20);
        assert_eq!(entries[3].length, 8);
        assert_eq!(entries[3].file, 1);
        assert_eq!(entries[3].jump, JumpKind::In);
    }

    #[test]
    fn sentinel_file_index_survives_decoding() {
        let entries = parse_source_map("0:0:-1:-;5:2:0:-").unwrap();
        assert_eq!(entries[0].file, -1);
        assert_eq!(entries[1].file, 0);
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert!(parse_source_map("a:0:0:-").is_err());
    }
}
