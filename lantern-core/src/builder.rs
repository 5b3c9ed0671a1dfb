// Dependency graph construction from a page trace

use crate::error::Result;
use crate::trace::PageTrace;
use lantern_sim::{DependencyGraph, GraphError, NetworkRecord, Node, NodeIndex};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Main-thread tasks shorter than this that start no requests are
/// dropped from the graph.
pub const MINIMUM_TASK_DURATION: f64 = 10.0;

/// Builds the page dependency graph.
///
/// Every request becomes a network node depending on its initiator
/// (by request id, else by a unique initiator URL that had finished,
/// else the main document). Tasks become CPU nodes that wait on the
/// requests they evaluate and gate the requests they start.
pub fn build_dependency_graph(trace: &PageTrace) -> Result<DependencyGraph> {
    let main_document = trace
        .main_document()
        .ok_or(GraphError::MissingMainDocument)?;

    let mut records: Vec<&NetworkRecord> = trace.records.iter().collect();
    records.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut graph = DependencyGraph::new(Node::network(main_document.clone()));
    let root = graph.root();
    let mut request_nodes: Vec<(NodeIndex, &NetworkRecord)> = vec![(root, main_document)];
    for &record in &records {
        if record.request_id == main_document.request_id {
            continue;
        }
        let index = graph.add_node(Node::network(record.clone()))?;
        request_nodes.push((index, record));
    }

    for &(index, record) in request_nodes.iter().skip(1) {
        let initiator = find_initiator(&graph, &request_nodes, index, record).unwrap_or(root);
        graph.add_dependency(index, initiator)?;
    }

    add_cpu_nodes(&mut graph, trace, &request_nodes)?;

    graph.topological_order()?;
    debug!(
        "Built dependency graph with {} nodes and {} edges",
        graph.len(),
        graph.edge_count()
    );
    Ok(graph)
}

fn find_initiator(
    graph: &DependencyGraph,
    request_nodes: &[(NodeIndex, &NetworkRecord)],
    index: NodeIndex,
    record: &NetworkRecord,
) -> Option<NodeIndex> {
    if let Some(initiator_id) = &record.initiator_request_id {
        match graph.index_of(initiator_id) {
            Some(initiator) if initiator != index => return Some(initiator),
            Some(_) => {}
            None => warn!(
                "Request {} names unknown initiator {}",
                record.request_id, initiator_id
            ),
        }
    }

    let initiator_url = record.initiator_url.as_ref()?;
    let candidates: Vec<NodeIndex> = request_nodes
        .iter()
        .filter(|(candidate, candidate_record)| {
            *candidate != index
                && &candidate_record.url == initiator_url
                && candidate_record.end_time <= record.start_time
        })
        .map(|(candidate, _)| *candidate)
        .collect();

    match candidates.as_slice() {
        [only] => Some(*only),
        [] => None,
        _ => {
            debug!(
                "Initiator URL {} of {} is ambiguous",
                initiator_url, record.request_id
            );
            None
        }
    }
}

fn add_cpu_nodes(
    graph: &mut DependencyGraph,
    trace: &PageTrace,
    request_nodes: &[(NodeIndex, &NetworkRecord)],
) -> Result<()> {
    let root = graph.root();
    let mut tasks: Vec<_> = trace.tasks.iter().enumerate().collect();
    tasks.sort_by(|(_, a), (_, b)| a.start_time.total_cmp(&b.start_time));

    let mut used_ids: HashSet<String> = HashSet::new();
    for (position, task) in tasks {
        if task.duration < MINIMUM_TASK_DURATION && task.initiated_request_ids.is_empty() {
            continue;
        }

        let mut id = task
            .id
            .clone()
            .unwrap_or_else(|| format!("cpu-{}", position));
        if used_ids.contains(&id) || graph.index_of(&id).is_some() {
            id = format!("{}-{}", id, position);
        }
        used_ids.insert(id.clone());
        let node = graph.add_node(Node::cpu(id, task.to_cpu_node()))?;

        let mut has_dependency = false;
        for url in &task.attributable_urls {
            let latest = request_nodes
                .iter()
                .filter(|(_, record)| &record.url == url && record.end_time <= task.start_time)
                .max_by(|(_, a), (_, b)| a.end_time.total_cmp(&b.end_time))
                .map(|(index, _)| *index);
            if let Some(request) = latest {
                graph.add_dependency(node, request)?;
                has_dependency = true;
            }
        }
        if !has_dependency {
            graph.add_dependency(node, root)?;
        }

        for request_id in &task.initiated_request_ids {
            let Some(request) = graph.index_of(request_id) else {
                warn!("Task at {}ms initiated unknown request {}", task.start_time, request_id);
                continue;
            };
            if request != root && graph[request].start_time() >= task.start_time {
                graph.add_dependency(request, node)?;
            }
        }
    }
    Ok(())
}
