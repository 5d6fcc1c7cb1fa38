//! Opcode chain construction from flat disassembly text.
//!
//! The disassembler emits one whitespace-separated token per mnemonic, with
//! push operands as separate hex-literal tokens. Rebuilding program counters
//! therefore has to re-merge each push with its operand before address
//! assignment: pc(i+1) = pc(i) + 1 + operand_width(i).

use crate::utils::num::to_u256;
use alloy::primitives::U256;
use std::collections::HashMap;

/// Source attribution state of one instruction. Set once during
/// source-map correlation; `Pending` only exists before that pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRegion {
    Pending,
    Unmapped,
    Mapped {
        offset: usize,
        length: usize,
        file: u32,
    },
}

impl SourceRegion {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub pc: usize,
    pub mnemonic: String,
    /// Parsed push operand. `None` for non-push instructions and for
    /// malformed operand tokens.
    pub push_value: Option<U256>,
    /// Operand byte width. Zero for non-push instructions and for push
    /// mnemonics whose width digits could not be recovered.
    pub width: usize,
    pub function: Option<usize>,
    /// Entry pc of the owning basic block, bound during CFG construction.
    pub block: Option<usize>,
    pub source: SourceRegion,
}

impl Instruction {
    pub fn is_jumpdest(&self) -> bool {
        self.mnemonic == "JUMPDEST"
    }

    pub fn is_jump(&self) -> bool {
        self.mnemonic == "JUMP"
    }
}

/// Address-indexed instruction arena. Instructions are stored in pc order;
/// neighbour traversal is slot arithmetic instead of node links.
#[derive(Debug, Default)]
pub struct OpcodeChain {
    instructions: Vec<Instruction>,
    by_pc: HashMap<usize, usize>,
    pub has_call: bool,
    pub has_selfdestruct: bool,
}

impl OpcodeChain {
    pub fn build(disassembly: &str) -> Self {
        // Re-attach push operands to their mnemonics. A hex token without a
        // preceding bare push mnemonic stays a standalone zero-width entry
        // (the disassembler emits those for data mistaken for code).
        let mut merged: Vec<(String, Option<String>)> = Vec::new();
        for token in disassembly.split_whitespace() {
            let attachable = token.starts_with("0x")
                && matches!(merged.last(), Some((m, None)) if m.starts_with("PUSH"));
            if attachable {
                if let Some(last) = merged.last_mut() {
                    last.1 = Some(token.to_string());
                }
            } else {
                merged.push((token.to_string(), None));
            }
        }

        let mut chain = Self::default();
        let mut pc = 0usize;
        for (mnemonic, literal) in merged {
            chain.note_traits(&mnemonic);
            // A push with no trailing literal is an upstream disassembly
            // artifact; it stays in the chain with zero operand width.
            let width = match &literal {
                Some(_) => push_width(&mnemonic).unwrap_or(0),
                None => 0,
            };
            let push_value = literal.as_deref().and_then(to_u256);
            let slot = chain.instructions.len();
            chain.by_pc.insert(pc, slot);
            chain.instructions.push(Instruction {
                pc,
                mnemonic,
                push_value,
                width,
                function: None,
                block: None,
                source: SourceRegion::Pending,
            });
            pc += 1 + width;
        }
        chain
    }

    fn note_traits(&mut self, mnemonic: &str) {
        match mnemonic {
            "CALL" | "CALLCODE" => self.has_call = true,
            "SELFDESTRUCT" | "SUICIDE" => self.has_selfdestruct = true,
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn contains(&self, pc: usize) -> bool {
        self.by_pc.contains_key(&pc)
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.by_pc.get(&pc).map(|&slot| &self.instructions[slot])
    }

    pub fn get_mut(&mut self, pc: usize) -> Option<&mut Instruction> {
        match self.by_pc.get(&pc) {
            Some(&slot) => self.instructions.get_mut(slot),
            None => None,
        }
    }

    pub fn slot_of(&self, pc: usize) -> Option<usize> {
        self.by_pc.get(&pc).copied()
    }

    pub fn at_slot(&self, slot: usize) -> Option<&Instruction> {
        self.instructions.get(slot)
    }

    pub fn at_slot_mut(&mut self, slot: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(slot)
    }

    /// Instruction immediately before `pc` in address order.
    pub fn prev(&self, pc: usize) -> Option<&Instruction> {
        let slot = self.slot_of(pc)?;
        slot.checked_sub(1).and_then(|s| self.instructions.get(s))
    }

    /// Instruction immediately after `pc` in address order.
    pub fn next(&self, pc: usize) -> Option<&Instruction> {
        let slot = self.slot_of(pc)?;
        self.instructions.get(slot + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions.iter_mut()
    }
}

fn push_width(mnemonic: &str) -> Option<usize> {
    let digits: String = mnemonic.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
