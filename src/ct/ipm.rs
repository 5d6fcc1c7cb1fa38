//! Input-parameter model for one fuzz-candidate function.
//!
//! Builds the per-parameter domains over a set of representative program
//! states, submits them with implication constraints to the covering
//! engine, and decodes the returned rows into state-scoped concrete test
//! cases.

use crate::contract::function::Function;
use crate::contract::types::{IndexValueStore, Value};
use crate::ct::oracle::{Constraint, CoveringEngine, CoveringRequest};
use crate::ct::parameter::CtParameter;
use crate::ct::STATE_COLUMN;
use crate::explore::tree::NodeId;
use std::collections::BTreeMap;

/// One abstracted global-storage snapshot conditioning value choices.
/// `node` is `None` only for the deployment pseudo-state, which carries no
/// observed index values.
#[derive(Debug, Clone, Default)]
pub struct RepState {
    pub node: Option<NodeId>,
    pub index_values: IndexValueStore,
}

/// One decoded covering row: a concrete assignment per original parameter
/// name, tagged with the representative state it was generated under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtTestCase {
    pub state: Option<NodeId>,
    pub assignments: BTreeMap<String, Value>,
}

/// Values a state contributes to one parameter: observed index values for
/// the state variables the parameter drives at each indirection depth,
/// minus values already in the base domain, numeric ones clamped to the
/// parameter's representable range.
fn state_values_for(function: &Function, state: &RepState) -> Vec<Vec<Value>> {
    let mut per_param = vec![Vec::new(); function.params.len()];
    if state.node.is_none() {
        return per_param;
    }
    for (position, param) in function.params.iter().enumerate() {
        // Observed addresses are never injected into the implicit caller:
        // an arbitrary address there is not execution-valid.
        if param.is_sender() {
            continue;
        }
        // Only parameters observed driving an indexed read take state
        // values at all.
        if !param.used_as_index() {
            continue;
        }
        let Some(ty) = &param.ty else {
            continue;
        };
        let Some(levels) = state.index_values.levels_for(ty) else {
            continue;
        };
        let out = &mut per_param[position];
        for (level, state_vars) in &param.index_reads {
            let Some(recorded) = levels.get(level) else {
                continue;
            };
            for state_var in state_vars {
                let Some(values) = recorded.get(state_var) else {
                    continue;
                };
                for value in values {
                    if param.base_values.contains(value) {
                        continue;
                    }
                    if ty.is_numeric() && !ty.bounds_contain(value) {
                        continue;
                    }
                    if !out.contains(value) {
                        out.push(value.clone());
                    }
                }
            }
        }
    }
    per_param
}

#[derive(Debug)]
pub struct CtIpm {
    system: String,
    rep_states: Vec<RepState>,
    parameters: Vec<CtParameter>,
    pub strength: u8,
}

impl CtIpm {
    pub fn build(function: &Function, states: &[RepState], strength: u8) -> Self {
        let rep_states: Vec<RepState> = if states.is_empty() {
            vec![RepState::default()]
        } else {
            states.to_vec()
        };

        // Parameter position -> (state, contributed values), in state order.
        let mut contributions: Vec<Vec<(NodeId, Vec<Value>)>> =
            vec![Vec::new(); function.params.len()];
        for state in &rep_states {
            let per_param = state_values_for(function, state);
            if let Some(node) = state.node {
                for (position, values) in per_param.into_iter().enumerate() {
                    if !values.is_empty() {
                        contributions[position].push((node, values));
                    }
                }
            }
        }

        let parameters = function
            .params
            .iter()
            .enumerate()
            .map(|(position, param)| {
                CtParameter::build(param, position, &contributions[position])
            })
            .collect();

        Self {
            system: function.full_name.clone(),
            rep_states,
            parameters,
            strength,
        }
    }

    pub fn rep_states(&self) -> &[RepState] {
        &self.rep_states
    }

    pub fn parameters(&self) -> &[CtParameter] {
        &self.parameters
    }

    /// Assemble the submission: the reserved state column first, then every
    /// parameter domain as its index list, then one implication constraint
    /// per (state, parameter) pair.
    pub fn submission(&self) -> CoveringRequest {
        let mut parameters = Vec::with_capacity(self.parameters.len() + 1);
        parameters.push((
            STATE_COLUMN.to_string(),
            (0..self.rep_states.len()).map(|i| i.to_string()).collect(),
        ));
        for parameter in &self.parameters {
            parameters.push((
                parameter.name().to_string(),
                (0..parameter.domain().len()).map(|i| i.to_string()).collect(),
            ));
        }

        let mut constraints = Vec::new();
        for (state_index, state) in self.rep_states.iter().enumerate() {
            for parameter in &self.parameters {
                constraints.push(Constraint {
                    text: parameter.constraint_for(state.node, state_index),
                    vars: vec![STATE_COLUMN.to_string(), parameter.name().to_string()],
                });
            }
        }

        CoveringRequest {
            system: self.system.clone(),
            parameters,
            constraints,
            strength: self.strength,
        }
    }

    /// Generate and decode covering test cases. A function without
    /// parameters never queries the engine; an engine failure degrades to
    /// an empty round.
    pub fn test_cases(&self, engine: &dyn CoveringEngine) -> Vec<CtTestCase> {
        if self.parameters.is_empty() {
            return Vec::new();
        }
        let request = self.submission();
        match engine.covering_array(&request) {
            Ok(table) => self.decode(&table),
            Err(err) => {
                eprintln!("[WARN] covering engine failed for {}: {err}", self.system);
                Vec::new()
            }
        }
    }

    /// Decode the whitespace table: header names are constraint variables,
    /// rows are index assignments. The state column resolves positionally
    /// into the representative state; other columns resolve through each
    /// parameter's domain. Rows that do not decode are dropped with a
    /// warning; a truncated table is still partially usable.
    pub fn decode(&self, table: &str) -> Vec<CtTestCase> {
        let mut lines = table.trim().lines();
        let Some(header) = lines.next() else {
            return Vec::new();
        };
        let keys: Vec<String> = header
            .replace('"', "")
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let by_name: BTreeMap<&str, &CtParameter> = self
            .parameters
            .iter()
            .map(|p| (p.name(), p))
            .collect();

        let mut cases = Vec::new();
        'rows: for (row, line) in lines.enumerate() {
            let cells: Vec<&str> = line.split_whitespace().collect();
            if cells.len() != keys.len() {
                eprintln!(
                    "[WARN] covering row {row} has {} cells, expected {}",
                    cells.len(),
                    keys.len()
                );
                continue;
            }
            let mut state = None;
            let mut assignments = BTreeMap::new();
            for (key, cell) in keys.iter().zip(&cells) {
                let Ok(index) = cell.parse::<usize>() else {
                    eprintln!("[WARN] covering row {row}: `{cell}` is not an index");
                    continue 'rows;
                };
                if key.as_str() == STATE_COLUMN {
                    let Some(rep) = self.rep_states.get(index) else {
                        eprintln!("[WARN] covering row {row}: state index {index} out of range");
                        continue 'rows;
                    };
                    state = rep.node;
                } else {
                    let Some(parameter) = by_name.get(key.as_str()) else {
                        eprintln!("[WARN] covering row {row}: unknown column `{key}`");
                        continue 'rows;
                    };
                    let Some(value) = parameter.value_at(index) else {
                        eprintln!("[WARN] covering row {row}: index {index} outside `{key}` domain");
                        continue 'rows;
                    };
                    assignments
                        .insert(parameter.original_name().to_string(), value.clone());
                }
            }
            cases.push(CtTestCase { state, assignments });
        }
        cases
    }
}
