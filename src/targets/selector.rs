//! Label-based node selection.
//!
//! A [`NodeSelector`] is a list of terms. A node is selected when it matches
//! at least one term, and matches a term when every expression in the term
//! holds. A selector with no terms selects every node.
//!
//! Operators arrive as free-form strings from the command resource, so a
//! selector is [compiled](NodeSelector::compile) before use. Compilation
//! rejects unknown operators for the whole selector up front, which keeps the
//! outcome independent of node order and of term short-circuiting.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::targets::NodeRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown operator {operator:?} for key {key:?} (term {term}, expression {expression})")]
    UnknownOperator {
        key: String,
        operator: String,
        term: usize,
        expression: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::In => write!(f, "In"),
            Operator::NotIn => write!(f, "NotIn"),
            Operator::Exists => write!(f, "Exists"),
            Operator::DoesNotExist => write!(f, "DoesNotExist"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpression {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl MatchExpression {
    pub fn new(key: impl Into<String>, operator: Operator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator: operator.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<MatchExpression>,
}

impl SelectorTerm {
    pub fn new(match_expressions: Vec<MatchExpression>) -> Self {
        Self { match_expressions }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelector {
    #[serde(default, rename = "nodeSelectorTerms")]
    pub terms: Vec<SelectorTerm>,
}

impl NodeSelector {
    pub fn new(terms: Vec<SelectorTerm>) -> Self {
        Self { terms }
    }

    /// Validate every expression and produce a selector that can be
    /// evaluated without further error checks.
    pub fn compile(&self) -> Result<CompiledSelector, ConfigError> {
        let mut terms = Vec::with_capacity(self.terms.len());
        for (term_idx, term) in self.terms.iter().enumerate() {
            let mut expressions = Vec::with_capacity(term.match_expressions.len());
            for (expr_idx, expr) in term.match_expressions.iter().enumerate() {
                let operator = expr
                    .operator
                    .parse()
                    .map_err(|()| ConfigError::UnknownOperator {
                        key: expr.key.clone(),
                        operator: expr.operator.clone(),
                        term: term_idx,
                        expression: expr_idx,
                    })?;
                expressions.push(CompiledExpression {
                    key: expr.key.clone(),
                    operator,
                    values: expr.values.iter().cloned().collect(),
                });
            }
            terms.push(expressions);
        }
        Ok(CompiledSelector { terms })
    }
}

#[derive(Debug, Clone)]
struct CompiledExpression {
    key: String,
    operator: Operator,
    values: HashSet<String>,
}

impl CompiledExpression {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            // Absence of the label passes.
            Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// A validated [`NodeSelector`].
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    terms: Vec<Vec<CompiledExpression>>,
}

impl CompiledSelector {
    /// OR across terms, AND within a term. No terms selects everything.
    pub fn matches_labels(&self, labels: &HashMap<String, String>) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        self.terms
            .iter()
            .any(|term| term.iter().all(|expr| expr.matches(labels)))
    }

    pub fn matches(&self, node: &NodeRecord) -> bool {
        self.matches_labels(&node.labels)
    }
}

/// Decide whether `node` is selected by `selector`.
pub fn matches(node: &NodeRecord, selector: &NodeSelector) -> Result<bool, ConfigError> {
    Ok(selector.compile()?.matches(node))
}
