// Value-weighted directed flow graph over XtzFlows. Edges
// aggregate by (sender, target); node size is a log-scaled function of
// activity; edge color is a linear blue-purple-red gradient over total
// value. Exceeding the node cap retains only the most active nodes and
// drops any edge touching an excluded one.

use crate::store::raw::XtzFlow;
use ahash::AHashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub address: String,
    pub activity: i64,
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub total_value: i64,
    pub count: i64,
    pub avg_value: f64,
    pub color: (u8, u8, u8),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn node_size(activity: i64) -> f64 {
    ((activity + 1) as f64).log10() * 5.0 + 5.0
}

/// Blue (0,0,255) -> purple (128,0,128) -> red (255,0,0), `t` in [0, 1].
fn gradient_color(t: f64) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8, t: f64| -> u8 { (a as f64 + (b as f64 - a as f64) * t).round() as u8 };
    if t < 0.5 {
        let local = t * 2.0;
        (lerp(0, 128, local), 0, lerp(255, 128, local))
    } else {
        let local = (t - 0.5) * 2.0;
        (lerp(128, 255, local), 0, lerp(128, 0, local))
    }
}

pub fn build(flows: &[XtzFlow], node_cap: Option<usize>) -> FlowGraph {
    let mut edge_acc: AHashMap<(String, String), (i64, i64)> = AHashMap::new();
    for flow in flows {
        let entry = edge_acc.entry((flow.sender.clone(), flow.target.clone())).or_insert((0, 0));
        entry.0 += flow.amount;
        entry.1 += 1;
    }

    let mut activity: AHashMap<String, i64> = AHashMap::new();
    for ((sender, target), (_, count)) in &edge_acc {
        *activity.entry(sender.clone()).or_insert(0) += count;
        *activity.entry(target.clone()).or_insert(0) += count;
    }

    let min_value = edge_acc.values().map(|(v, _)| *v).min().unwrap_or(0);
    let max_value = edge_acc.values().map(|(v, _)| *v).max().unwrap_or(0);
    let value_range = (max_value - min_value).max(1) as f64;

    let mut nodes: Vec<GraphNode> = activity
        .iter()
        .map(|(address, activity)| GraphNode { address: address.clone(), activity: *activity, size: node_size(*activity) })
        .collect();
    nodes.sort_by(|a, b| b.activity.cmp(&a.activity).then_with(|| a.address.cmp(&b.address)));

    let retained: std::collections::HashSet<String> = match node_cap {
        Some(cap) if nodes.len() > cap => nodes.iter().take(cap).map(|n| n.address.clone()).collect(),
        _ => nodes.iter().map(|n| n.address.clone()).collect(),
    };
    if let Some(cap) = node_cap {
        nodes.truncate(cap);
    }

    let mut edges: Vec<GraphEdge> = edge_acc
        .into_iter()
        .filter(|((sender, target), _)| retained.contains(sender) && retained.contains(target))
        .map(|((sender, target), (total_value, count))| {
            let t = (total_value - min_value) as f64 / value_range;
            GraphEdge {
                source: sender,
                target,
                total_value,
                count,
                avg_value: total_value as f64 / count as f64,
                color: gradient_color(t),
            }
        })
        .collect();
    edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));

    FlowGraph { nodes, edges }
}
