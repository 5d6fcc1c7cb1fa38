//! External-gateway session context.
//!
//! The covering engine and the solver are capabilities injected into the
//! components that need them, never ambient globals: a session opens them
//! together, hands out borrows, and closes them when dropped.

use crate::ct::oracle::CoveringEngine;
use crate::explore::reachability::{configure_solver, Z3Prober};
use z3::{Config, Context, Solver};

pub struct Gateways<'ctx> {
    pub covering: Box<dyn CoveringEngine>,
    pub ctx: &'ctx Context,
    pub solver: &'ctx Solver<'ctx>,
}

impl<'ctx> Gateways<'ctx> {
    pub fn open(
        covering: Box<dyn CoveringEngine>,
        ctx: &'ctx Context,
        solver: &'ctx Solver<'ctx>,
    ) -> Self {
        Self {
            covering,
            ctx,
            solver,
        }
    }

    pub fn covering(&self) -> &dyn CoveringEngine {
        self.covering.as_ref()
    }

    pub fn prober(&self) -> Z3Prober<'ctx> {
        Z3Prober::new(self.ctx, self.solver)
    }
}

/// Run one analysis session: solver context and covering engine live for
/// exactly the duration of the closure.
pub fn with_session<T>(
    covering: Box<dyn CoveringEngine>,
    f: impl FnOnce(&Gateways) -> T,
) -> T {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);
    configure_solver(&ctx, &solver);
    let gateways = Gateways::open(covering, &ctx, &solver);
    f(&gateways)
}
