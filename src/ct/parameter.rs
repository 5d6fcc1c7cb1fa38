//! Per-parameter representative-value domain.
//!
//! A domain is the parameter's static base values followed by values
//! observed to flow into indexed state-variable reads under specific
//! program states. The position of a value in the domain is its identity
//! towards the covering engine, so the ordering is fixed once built and
//! must survive until the returned array is decoded.

use crate::contract::function::Parameter;
use crate::contract::types::Value;
use crate::ct::STATE_COLUMN;
use crate::explore::tree::NodeId;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct CtParameter {
    /// Constraint-variable name: dots replaced, empty names synthesized
    /// from the declaration position (the engine rejects both).
    name: String,
    original_name: String,
    rep_values: Vec<Value>,
    /// Domain index -> program states known to have produced that value.
    /// An empty set means the value is valid in every state.
    index_states: BTreeMap<usize, BTreeSet<NodeId>>,
}

impl CtParameter {
    pub(crate) fn build(
        param: &Parameter,
        position: usize,
        state_values: &[(NodeId, Vec<Value>)],
    ) -> Self {
        let name = if param.name.contains('.') {
            param.name.replace('.', "_")
        } else if param.name.is_empty() {
            format!("MISSING_NAME_{position}")
        } else {
            param.name.clone()
        };

        let mut rep_values = param.base_values.clone();
        for (_, values) in state_values {
            for value in values {
                if !rep_values.contains(value) {
                    rep_values.push(value.clone());
                }
            }
        }

        let mut index_states = BTreeMap::new();
        for (index, value) in rep_values.iter().enumerate() {
            let states: BTreeSet<NodeId> = state_values
                .iter()
                .filter(|(_, values)| values.contains(value))
                .map(|(state, _)| *state)
                .collect();
            index_states.insert(index, states);
        }

        Self {
            name,
            original_name: param.name.clone(),
            rep_values,
            index_states,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn domain(&self) -> &[Value] {
        &self.rep_values
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.rep_values.get(index)
    }

    pub fn states_at(&self, index: usize) -> Option<&BTreeSet<NodeId>> {
        self.index_states.get(&index)
    }

    /// Indices usable under `state`: every index with no recorded states,
    /// plus those that recorded this exact state.
    pub fn valid_indexes(&self, state: Option<NodeId>) -> Vec<usize> {
        self.index_states
            .iter()
            .filter(|(_, states)| {
                states.is_empty() || state.map(|s| states.contains(&s)).unwrap_or(false)
            })
            .map(|(&index, _)| index)
            .collect()
    }

    /// Implication constraint for one representative state: fixing the
    /// state column restricts this parameter to its valid indices.
    pub fn constraint_for(&self, state: Option<NodeId>, state_index: usize) -> String {
        let left = format!("{STATE_COLUMN} = \"{state_index}\"");
        let right = self
            .valid_indexes(state)
            .iter()
            .map(|index| format!("{} = \"{index}\"", self.name))
            .collect::<Vec<_>>()
            .join(" || ");
        format!("{left} => ({right})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::types::SolType;
    use alloy::primitives::U256;

    fn uint_param(name: &str, base: &[u64]) -> Parameter {
        Parameter {
            name: name.to_string(),
            ty: Some(SolType::Uint(256)),
            base_values: base.iter().map(|&v| Value::Uint(U256::from(v))).collect(),
            index_reads: BTreeMap::new(),
            index_writes: BTreeMap::new(),
        }
    }

    #[test]
    fn state_values_extend_the_domain_in_order() {
        let param = uint_param("amount", &[0, 1]);
        let state = NodeId(7);
        let ct = CtParameter::build(&param, 0, &[(state, vec![Value::Uint(U256::from(5u8))])]);
        assert_eq!(
            ct.domain(),
            &[
                Value::Uint(U256::ZERO),
                Value::Uint(U256::from(1u8)),
                Value::Uint(U256::from(5u8)),
            ]
        );
        assert!(ct.states_at(0).unwrap().is_empty());
        assert!(ct.states_at(1).unwrap().is_empty());
        assert_eq!(
            ct.states_at(2).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![state]
        );
    }

    #[test]
    fn constraint_restricts_state_bound_indices() {
        let param = uint_param("amount", &[0]);
        let s1 = NodeId(1);
        let s2 = NodeId(2);
        let ct = CtParameter::build(
            &param,
            0,
            &[
                (s1, vec![Value::Uint(U256::from(5u8))]),
                (s2, vec![Value::Uint(U256::from(9u8))]),
            ],
        );
        // Index 0 (base) is valid everywhere; 1 only under s1; 2 only under s2.
        assert_eq!(ct.valid_indexes(Some(s1)), vec![0, 1]);
        assert_eq!(ct.valid_indexes(Some(s2)), vec![0, 2]);
        assert_eq!(ct.valid_indexes(None), vec![0]);
        assert_eq!(
            ct.constraint_for(Some(s1), 0),
            "GLOBAL_STATE = \"0\" => (amount = \"0\" || amount = \"1\")"
        );
    }

    #[test]
    fn sanitizes_constraint_names() {
        let sender = uint_param("msg.sender", &[]);
        let ct = CtParameter::build(&sender, 0, &[]);
        assert_eq!(ct.name(), "msg_sender");
        assert_eq!(ct.original_name(), "msg.sender");

        let unnamed = uint_param("", &[]);
        let ct = CtParameter::build(&unnamed, 3, &[]);
        assert_eq!(ct.name(), "MISSING_NAME_3");
    }
}
