use crate::types::Finding;
use alloy_primitives::{Address, aliases::U256};
use petgraph::Directed;
use petgraph::dot::Dot;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::fmt::Display;

/// SummaryEdge
///
/// Aggregate of every finding between one (sender, receiver) pair.
#[derive(Debug, Clone)]
pub struct SummaryEdge {
    pub transfer_count: usize,
    pub total_amount: U256,
}

impl Display for SummaryEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} transfers / {}", self.transfer_count, self.total_amount)
    }
}

/// HopSummary
///
/// A directed graph aggregating the findings of a trace: nodes are
/// addresses, edges collapse every finding between a (sender, receiver)
/// pair into a count and a summed amount.
pub struct HopSummary {
    pub summary_graph: Graph<Address, SummaryEdge, Directed>,
}

impl HopSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        // Accumulate count and amount per (sender, receiver) pair
        let mut acc: HashMap<(Address, Address), SummaryEdge> = HashMap::new();

        for finding in findings {
            let key = (finding.transfer.sender, finding.transfer.receiver);
            let entry = acc.entry(key).or_insert(SummaryEdge {
                transfer_count: 0,
                total_amount: U256::ZERO,
            });
            entry.transfer_count += 1;
            entry.total_amount = entry.total_amount.saturating_add(finding.transfer.amount);
        }

        // Sort the pairs so node and edge order is stable run to run
        let mut pairs: Vec<_> = acc.into_iter().collect();
        pairs.sort_by_key(|((from, to), _)| (*from, *to));

        let mut summary_graph = Graph::<Address, SummaryEdge, Directed>::new();
        let mut node_map = HashMap::<Address, NodeIndex>::new();

        for ((from, to), edge) in pairs {
            let from_index = *node_map
                .entry(from)
                .or_insert_with(|| summary_graph.add_node(from));
            let to_index = *node_map
                .entry(to)
                .or_insert_with(|| summary_graph.add_node(to));

            summary_graph.add_edge(from_index, to_index, edge);
        }

        Self { summary_graph }
    }

    /// DOT rendition for visualization, e.g. with
    /// `https://dreampuf.github.io/GraphvizOnline/?engine=dot`
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.summary_graph))
    }
}

impl Display for HopSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rows: Vec<(Address, Address, &SummaryEdge)> = self
            .summary_graph
            .edge_references()
            .map(|edge| {
                (
                    self.summary_graph[edge.source()],
                    self.summary_graph[edge.target()],
                    edge.weight(),
                )
            })
            .collect();

        rows.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.2.transfer_count.cmp(&a.2.transfer_count))
        });

        for (from, to, edge) in rows {
            writeln!(
                f,
                "{:.36} -> {:.36} for {} transfers, {} total",
                from, to, edge.transfer_count, edge.total_amount
            )?;
        }
        Ok(())
    }
}
