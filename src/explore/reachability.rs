//! Satisfiability-backed reachability probing.
//!
//! For every fuzz candidate the prober pushes one solver frame, asserts the
//! node's storage view and the candidate's require conditions over 256-bit
//! vectors, asks for satisfiability and pops the frame; the assertion
//! stack always returns to its prior depth, success or not. `Unknown` is
//! fatal for the node being computed: guessing reachability corrupts the
//! exploration ordering.

use crate::contract::function::{Function, FunctionId, Operand, Require};
use crate::contract::metadata::CmpOp;
use crate::contract::types::{SolType, Value};
use crate::contract::Contract;
use crate::error::SolverError;
use alloy::primitives::U256;
use std::collections::BTreeMap;
use z3::ast::{Ast, Bool, BV};
use z3::{Config, Context, SatResult, Solver};

/// Concrete state-variable assignments of the node under probe.
pub type StorageView = BTreeMap<String, Value>;

pub trait ReachabilityProber {
    fn reachable(
        &mut self,
        contract: &Contract,
        storage: &StorageView,
    ) -> Result<Vec<FunctionId>, SolverError>;
}

/// Deterministic solver setup shared by every probe.
pub fn configure_solver(ctx: &Context, solver: &Solver) {
    let mut params = z3::Params::new(ctx);
    params.set_u32("timeout", 60_000);
    params.set_u32("random_seed", 42);
    solver.set_params(&params);
}

/// Open a solver session for one closure; context and solver live exactly
/// as long as the call.
pub fn run_with_solver<T>(f: impl FnOnce(&Context, &Solver) -> T) -> T {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);
    configure_solver(&ctx, &solver);
    f(&ctx, &solver)
}

/// Scoped assertion frame: pushed on entry, popped on drop, so early
/// returns and error paths cannot leave the stack unbalanced.
struct SolverScope<'ctx, 'a> {
    solver: &'a Solver<'ctx>,
}

impl<'ctx, 'a> SolverScope<'ctx, 'a> {
    fn enter(solver: &'a Solver<'ctx>) -> Self {
        solver.push();
        Self { solver }
    }
}

impl Drop for SolverScope<'_, '_> {
    fn drop(&mut self) {
        self.solver.pop(1);
    }
}

/// Total mapping from a 256-bit integer to a 256-bit vector via big-endian
/// word packing; avoids string round-trips that can silently degrade
/// constants.
pub fn bv_from_u256<'ctx>(ctx: &'ctx Context, val: U256) -> BV<'ctx> {
    let bytes = val.to_be_bytes::<32>();
    let mut words = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            BV::from_u64(ctx, u64::from_be_bytes(buf), 64)
        })
        .collect::<Vec<_>>()
        .into_iter();
    let first = words.next().expect("32 bytes always yield four words");
    words.fold(first, |acc, word| acc.concat(&word))
}

pub struct Z3Prober<'ctx> {
    pub ctx: &'ctx Context,
    pub solver: &'ctx Solver<'ctx>,
}

impl<'ctx> Z3Prober<'ctx> {
    pub fn new(ctx: &'ctx Context, solver: &'ctx Solver<'ctx>) -> Self {
        Self { ctx, solver }
    }

    fn operand_bv(&self, operand: &Operand) -> Option<BV<'ctx>> {
        match operand {
            Operand::State(name) => Some(BV::new_const(self.ctx, format!("sv_{name}"), 256)),
            Operand::Param(name) => Some(BV::new_const(self.ctx, format!("p_{name}"), 256)),
            Operand::Sender => Some(BV::new_const(self.ctx, "msg_sender", 256)),
            Operand::Literal(value, _) => {
                value.as_word().map(|word| bv_from_u256(self.ctx, word))
            }
        }
    }

    fn operand_type<'c>(
        &self,
        contract: &'c Contract,
        function: &'c Function,
        operand: &'c Operand,
    ) -> Option<&'c SolType> {
        match operand {
            Operand::State(name) => contract
                .state_variables
                .get(name)
                .and_then(|sv| sv.ty.as_ref()),
            Operand::Param(name) => function.get_parameter(name).and_then(|p| p.ty.as_ref()),
            Operand::Literal(_, ty) => Some(ty),
            Operand::Sender => None,
        }
    }

    /// Encode one require as a boolean. Conditions over values with no
    /// 256-bit encoding (dynamic bytes, strings) are not representable
    /// here and yield `None`; the probe over-approximates by skipping
    /// them.
    fn encode_require(
        &self,
        contract: &Contract,
        function: &Function,
        require: &Require,
    ) -> Option<Bool<'ctx>> {
        let lhs = self.operand_bv(&require.lhs)?;
        let rhs = self.operand_bv(&require.rhs)?;
        let signed = [&require.lhs, &require.rhs].iter().any(|op| {
            matches!(
                self.operand_type(contract, function, op),
                Some(SolType::Int(_))
            )
        });
        Some(match (require.op, signed) {
            (CmpOp::Eq, _) => lhs._eq(&rhs),
            (CmpOp::Ne, _) => lhs._eq(&rhs).not(),
            (CmpOp::Lt, true) => lhs.bvslt(&rhs),
            (CmpOp::Lt, false) => lhs.bvult(&rhs),
            (CmpOp::Le, true) => lhs.bvsle(&rhs),
            (CmpOp::Le, false) => lhs.bvule(&rhs),
            (CmpOp::Gt, true) => lhs.bvsgt(&rhs),
            (CmpOp::Gt, false) => lhs.bvugt(&rhs),
            (CmpOp::Ge, true) => lhs.bvsge(&rhs),
            (CmpOp::Ge, false) => lhs.bvuge(&rhs),
        })
    }

    fn assert_storage(&self, storage: &StorageView) {
        for (name, value) in storage {
            if let Some(word) = value.as_word() {
                let sv = BV::new_const(self.ctx, format!("sv_{name}"), 256);
                self.solver.assert(&sv._eq(&bv_from_u256(self.ctx, word)));
            }
        }
    }
}

impl ReachabilityProber for Z3Prober<'_> {
    fn reachable(
        &mut self,
        contract: &Contract,
        storage: &StorageView,
    ) -> Result<Vec<FunctionId>, SolverError> {
        let mut reachable = Vec::new();
        for id in contract.fuzzing_candidates() {
            let function = &contract.functions[id];
            let _scope = SolverScope::enter(self.solver);
            self.assert_storage(storage);
            for require in &function.requires {
                if let Some(encoded) = self.encode_require(contract, function, require) {
                    self.solver.assert(&encoded);
                }
            }
            match self.solver.check() {
                SatResult::Sat => reachable.push(id),
                SatResult::Unsat => {}
                SatResult::Unknown => {
                    return Err(SolverError::Unknown {
                        function: function.full_name.clone(),
                    });
                }
            }
        }
        Ok(reachable)
    }
}
