use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};

/// Operator kinds of the structured query language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Syn,
    Near(u32),
    Window(u32),
    And,
    Or,
    Sum,
    WeightedAnd,
    WeightedSum,
}

impl OperatorKind {
    pub fn is_weighted(&self) -> bool {
        matches!(self, OperatorKind::WeightedAnd | OperatorKind::WeightedSum)
    }

    /// Whether the operator produces an inverted list (as opposed to a score list).
    pub fn produces_inverted_list(&self) -> bool {
        matches!(self, OperatorKind::Syn | OperatorKind::Near(_) | OperatorKind::Window(_))
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperatorKind::Syn => f.write_str("#SYN"),
            OperatorKind::Near(n) => write!(f, "#NEAR/{}", n),
            OperatorKind::Window(n) => write!(f, "#WINDOW/{}", n),
            OperatorKind::And => f.write_str("#AND"),
            OperatorKind::Or => f.write_str("#OR"),
            OperatorKind::Sum => f.write_str("#SUM"),
            OperatorKind::WeightedAnd => f.write_str("#WAND"),
            OperatorKind::WeightedSum => f.write_str("#WSUM"),
        }
    }
}

/// Children of a weighted operator. Holds `weights.len() == children.len()`, except while
/// a weight is waiting for its operand, when it holds one more weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedChildren {
    pub weights: Vec<f64>,
    pub children: Vec<QueryNode>,
}

impl WeightedChildren {
    pub fn new() -> Self {
        WeightedChildren::default()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &QueryNode)> {
        self.weights.iter().copied().zip(self.children.iter())
    }

    pub fn has_pending_weight(&self) -> bool {
        self.weights.len() > self.children.len()
    }
}

/// Structured query operator tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    Term { field: String, stem: String },
    Syn(Vec<QueryNode>),
    Near { distance: u32, children: Vec<QueryNode> },
    Window { distance: u32, children: Vec<QueryNode> },
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Sum(Vec<QueryNode>),
    WeightedAnd(WeightedChildren),
    WeightedSum(WeightedChildren),
    Score(Box<QueryNode>),
}

impl QueryNode {
    pub fn term(stem: impl Into<String>, field: impl Into<String>) -> Self {
        QueryNode::Term {
            field: field.into(),
            stem: stem.into(),
        }
    }

    /// An operator of `kind` with no arguments yet.
    pub fn empty(kind: OperatorKind) -> Self {
        match kind {
            OperatorKind::Syn => QueryNode::Syn(Vec::new()),
            OperatorKind::Near(distance) => QueryNode::Near { distance, children: Vec::new() },
            OperatorKind::Window(distance) => QueryNode::Window { distance, children: Vec::new() },
            OperatorKind::And => QueryNode::And(Vec::new()),
            OperatorKind::Or => QueryNode::Or(Vec::new()),
            OperatorKind::Sum => QueryNode::Sum(Vec::new()),
            OperatorKind::WeightedAnd => QueryNode::WeightedAnd(WeightedChildren::new()),
            OperatorKind::WeightedSum => QueryNode::WeightedSum(WeightedChildren::new()),
        }
    }

    /// Build a weighted operator from `(weight, child)` pairs.
    pub fn weighted(kind: OperatorKind, pairs: impl IntoIterator<Item = (f64, QueryNode)>) -> Result<Self> {
        let mut node = QueryNode::empty(kind);
        for (weight, child) in pairs {
            node.add_weight(weight)?;
            node.add(child)?;
        }
        Ok(node)
    }

    pub fn kind(&self) -> Option<OperatorKind> {
        match self {
            QueryNode::Term { .. } | QueryNode::Score(_) => None,
            QueryNode::Syn(_) => Some(OperatorKind::Syn),
            QueryNode::Near { distance, .. } => Some(OperatorKind::Near(*distance)),
            QueryNode::Window { distance, .. } => Some(OperatorKind::Window(*distance)),
            QueryNode::And(_) => Some(OperatorKind::And),
            QueryNode::Or(_) => Some(OperatorKind::Or),
            QueryNode::Sum(_) => Some(OperatorKind::Sum),
            QueryNode::WeightedAnd(_) => Some(OperatorKind::WeightedAnd),
            QueryNode::WeightedSum(_) => Some(OperatorKind::WeightedSum),
        }
    }

    pub fn produces_inverted_list(&self) -> bool {
        match self {
            QueryNode::Term { .. } => true,
            QueryNode::Score(_) => false,
            _ => self.kind().is_some_and(|kind| kind.produces_inverted_list()),
        }
    }

    /// Append an operand. Terms and SCORE take no further operands, and a weighted operator
    /// only accepts an operand right after its weight.
    pub fn add(&mut self, child: QueryNode) -> Result<()> {
        match self {
            QueryNode::Term { .. } => Err(Error::invalid_argument("A term accepts no arguments")),
            QueryNode::Score(_) => Err(Error::invalid_argument("#SCORE accepts exactly one argument")),
            QueryNode::Syn(children)
            | QueryNode::Near { children, .. }
            | QueryNode::Window { children, .. }
            | QueryNode::And(children)
            | QueryNode::Or(children)
            | QueryNode::Sum(children) => {
                children.push(child);
                Ok(())
            }
            QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) => {
                if !weighted.has_pending_weight() {
                    return Err(Error::invalid_argument(format!(
                        "Expected a weight before operand {}", child
                    )));
                }
                weighted.children.push(child);
                Ok(())
            }
        }
    }

    /// Append the weight of the next operand of a weighted operator.
    pub fn add_weight(&mut self, weight: f64) -> Result<()> {
        match self {
            QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) => {
                if weighted.has_pending_weight() {
                    return Err(Error::invalid_argument("Expected an operand, found a second weight"));
                }
                if !weight.is_finite() || weight < 0.0 {
                    return Err(Error::invalid_argument(format!("Invalid weight {}", weight)));
                }
                weighted.weights.push(weight);
                Ok(())
            }
            _ => Err(Error::invalid_argument("Only #WAND and #WSUM accept weights")),
        }
    }

    /// Drop a weight whose operand turned out to be empty (e.g. a stop word).
    pub fn discard_pending_weight(&mut self) {
        if let QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) = self {
            if weighted.has_pending_weight() {
                weighted.weights.pop();
            }
        }
    }

    /// Operands in order, weights dropped.
    pub fn children(&self) -> &[QueryNode] {
        match self {
            QueryNode::Term { .. } => &[],
            QueryNode::Score(child) => std::slice::from_ref(child.as_ref()),
            QueryNode::Syn(children)
            | QueryNode::Near { children, .. }
            | QueryNode::Window { children, .. }
            | QueryNode::And(children)
            | QueryNode::Or(children)
            | QueryNode::Sum(children) => children,
            QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) => &weighted.children,
        }
    }

    /// Check the invariants the evaluator relies on, before touching the corpus.
    pub fn validate(&self) -> Result<()> {
        match self {
            QueryNode::Term { stem, .. } => {
                if stem.is_empty() {
                    return Err(Error::structure("Empty term"));
                }
            }
            QueryNode::Syn(children)
            | QueryNode::Near { children, .. }
            | QueryNode::Window { children, .. } => {
                if let Some(bad) = children.iter().find(|child| !child.produces_inverted_list()) {
                    return Err(Error::structure(format!(
                        "Invalid argument {} in {}: expected a term, #SYN, #NEAR or #WINDOW", bad, self
                    )));
                }
            }
            QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) => {
                if weighted.weights.len() != weighted.children.len() {
                    return Err(Error::structure(format!(
                        "{} has {} weights for {} arguments", self,
                        weighted.weights.len(), weighted.children.len()
                    )));
                }
            }
            _ => {}
        }
        if let QueryNode::Near { distance: 0, .. } | QueryNode::Window { distance: 0, .. } = self {
            return Err(Error::structure(format!("{} needs a positive distance", self)));
        }

        self.children().iter().try_for_each(QueryNode::validate)
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryNode::Term { field, stem } => write!(f, "{}.{}", stem, field),
            QueryNode::Score(child) => write!(f, "#SCORE( {} )", child),
            QueryNode::WeightedAnd(weighted) | QueryNode::WeightedSum(weighted) => {
                write!(f, "{}( ", self.kind().map(|k| k.to_string()).unwrap_or_default())?;
                for (weight, child) in weighted.iter() {
                    write!(f, "{:.4} {} ", weight, child)?;
                }
                f.write_str(")")
            }
            _ => {
                write!(f, "{}( ", self.kind().map(|k| k.to_string()).unwrap_or_default())?;
                for child in self.children() {
                    write!(f, "{} ", child)?;
                }
                f.write_str(")")
            }
        }
    }
}
