//! Link graph of a bin's children, used to order state walks.

use crate::element::{Element, ElementFlags};
use crate::pipeline::bin::ChildList;
use daggy::{Dag, NodeIndex, Walker};
use std::collections::BTreeSet;

/// Walk priority among children that are ready at the same time.
fn rank(element: &Element) -> u8 {
    let flags = element.flags();
    if flags.contains(ElementFlags::SINK) {
        0
    } else if flags.contains(ElementFlags::SOURCE) {
        2
    } else {
        1
    }
}

/// The direct child of `bin` that contains `element`, if any.
fn owning_child(bin: &Element, element: &Element) -> Option<Element> {
    let mut cursor = element.clone();
    loop {
        let parent = cursor.parent()?;
        if parent == *bin {
            return Some(cursor);
        }
        cursor = parent;
    }
}

/// Order `children` for a state walk.
///
/// An element comes after every child it pushes data to, so sinks change
/// state before their upstream peers and sources come last. Among
/// elements that are ready together, sinks go first and sources last;
/// remaining ties keep insertion order. Links that leave the bin are
/// ignored.
pub(crate) fn sort_children(bin: &Element, children: &[Element]) -> ChildList {
    let mut dag: Dag<usize, ()> = Dag::with_capacity(children.len(), children.len());
    let nodes: Vec<NodeIndex> = (0..children.len()).map(|i| dag.add_node(i)).collect();

    for (i, child) in children.iter().enumerate() {
        for peer in child.downstream_peers() {
            let Some(owner) = owning_child(bin, &peer) else {
                continue;
            };
            let Some(j) = children.iter().position(|c| *c == owner) else {
                continue;
            };
            if i == j || dag.find_edge(nodes[i], nodes[j]).is_some() {
                continue;
            }
            if dag.add_edge(nodes[i], nodes[j], ()).is_err() {
                tracing::warn!(
                    bin = %bin.name(),
                    upstream = %child.name(),
                    downstream = %owner.name(),
                    "link forms a cycle, ignoring it for ordering"
                );
            }
        }
    }

    // Kahn's algorithm over reversed edges: a node is ready once all its
    // downstream peers are out.
    let mut out_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| dag.children(n).iter(&dag).count())
        .collect();
    let mut ready: BTreeSet<(u8, usize)> = out_degree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| (rank(&children[i]), i))
        .collect();

    let mut sorted = ChildList::with_capacity(children.len());
    while let Some((_, i)) = ready.pop_first() {
        sorted.push(children[i].clone());
        for (_, upstream) in dag.parents(nodes[i]).iter(&dag) {
            let u = dag[upstream];
            out_degree[u] -= 1;
            if out_degree[u] == 0 {
                ready.insert((rank(&children[u]), u));
            }
        }
    }

    sorted
}
