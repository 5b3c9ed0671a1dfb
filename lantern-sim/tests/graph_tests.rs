// Tests for the dependency graph model

use lantern_sim::graph::{CpuNode, DependencyGraph, Node, TraversalDirection};
use lantern_sim::{GraphError, NetworkRecord, NodeIndex};

fn request(id: &str, url: &str) -> Node {
    Node::network(NetworkRecord::new(id, url))
}

/// root -> a, root -> b, a -> c, b -> c
fn diamond() -> (DependencyGraph, [NodeIndex; 4]) {
    let mut graph = DependencyGraph::new(request("root", "https://example.com/"));
    let root = graph.root();
    let a = graph.add_node(request("a", "https://example.com/a.css")).unwrap();
    let b = graph.add_node(request("b", "https://example.com/b.js")).unwrap();
    let c = graph.add_node(request("c", "https://example.com/c.png")).unwrap();
    graph.add_dependency(a, root).unwrap();
    graph.add_dependency(b, root).unwrap();
    graph.add_dependency(c, a).unwrap();
    graph.add_dependency(c, b).unwrap();
    (graph, [root, a, b, c])
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_root_is_main_document() {
    let (graph, [root, ..]) = diamond();
    assert_eq!(graph.root(), root);
    assert_eq!(graph.main_document().id(), "root");
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.edge_count(), 4);
}

#[test]
fn test_duplicate_node_id_rejected() {
    let (mut graph, _) = diamond();
    let result = graph.add_node(request("a", "https://example.com/other.css"));
    assert_eq!(result, Err(GraphError::DuplicateNode("a".to_string())));
}

#[test]
fn test_self_dependency_rejected() {
    let (mut graph, [_, a, ..]) = diamond();
    assert!(matches!(
        graph.add_dependency(a, a),
        Err(GraphError::SelfDependency(_))
    ));
}

#[test]
fn test_unknown_node_rejected() {
    let (mut graph, [root, ..]) = diamond();
    assert!(matches!(
        graph.add_dependency(NodeIndex::new(42), root),
        Err(GraphError::UnknownNode(_))
    ));
}

#[test]
fn test_duplicate_edge_is_noop() {
    let (mut graph, [root, a, ..]) = diamond();
    graph.add_dependency(a, root).unwrap();
    assert_eq!(graph.edge_count(), 4);
}

#[test]
fn test_lookup_by_id() {
    let (graph, [_, _, b, _]) = diamond();
    assert_eq!(graph.index_of("b"), Some(b));
    assert_eq!(graph.node_by_id("b").and_then(|n| n.url()), Some("https://example.com/b.js"));
    assert!(graph.index_of("missing").is_none());
}

// ============================================================================
// Neighbour Tests
// ============================================================================

#[test]
fn test_dependencies_and_dependents() {
    let (graph, [root, a, b, c]) = diamond();
    assert_eq!(graph.dependencies(c), vec![a, b]);
    assert_eq!(graph.dependents(root), vec![a, b]);
    assert!(graph.dependencies(root).is_empty());
    assert!(graph.dependents(c).is_empty());
}

#[test]
fn test_remove_all_dependencies() {
    let (mut graph, [root, a, b, c]) = diamond();
    graph.remove_all_dependencies(c);
    assert!(graph.dependencies(c).is_empty());
    assert!(graph.dependents(a).is_empty());
    assert!(graph.dependents(b).is_empty());

    graph.add_dependency(c, root).unwrap();
    assert_eq!(graph.dependencies(c), vec![root]);
}

#[test]
fn test_remove_single_dependency() {
    let (mut graph, [_, a, b, c]) = diamond();
    assert!(graph.remove_dependency(c, a));
    assert!(!graph.remove_dependency(c, a));
    assert_eq!(graph.dependencies(c), vec![b]);
}

// ============================================================================
// Traversal Tests
// ============================================================================

#[test]
fn test_traverse_visits_diamond_once() {
    let (graph, [root, a, b, c]) = diamond();
    let mut visited = Vec::new();
    graph.traverse(|node, _| visited.push(node));
    assert_eq!(visited, vec![root, a, b, c]);
}

#[test]
fn test_traverse_passes_path() {
    let (graph, [root, a, _, c]) = diamond();
    let mut path_to_c = Vec::new();
    graph.traverse(|node, path| {
        if node == c {
            path_to_c = path.to_vec();
        }
    });
    assert_eq!(path_to_c, vec![root, a, c]);
}

#[test]
fn test_traverse_is_deterministic() {
    let (graph, _) = diamond();
    let mut first = Vec::new();
    let mut second = Vec::new();
    graph.traverse(|node, _| first.push(node));
    graph.traverse(|node, _| second.push(node));
    assert_eq!(first, second);
}

#[test]
fn test_traverse_dependencies_direction() {
    let (graph, [root, a, b, c]) = diamond();
    let ancestors = graph.collect_from(c, TraversalDirection::Dependencies);
    assert_eq!(ancestors, vec![c, a, b, root]);
}

#[test]
fn test_traverse_skips_orphans_but_sources_include_them() {
    let (mut graph, [root, ..]) = diamond();
    let orphan = graph.add_node(request("orphan", "https://example.com/o")).unwrap();
    let mut visited = Vec::new();
    graph.traverse(|node, _| visited.push(node));
    assert!(!visited.contains(&orphan));
    assert_eq!(visited.len(), 4);
    assert_eq!(graph.sources(), vec![root, orphan]);
}

#[test]
fn test_dependency_chain_and_is_dependent_on() {
    let (graph, [root, a, b, c]) = diamond();
    assert_eq!(graph.dependency_chain(c), vec![root, a, c]);
    assert!(graph.is_dependent_on(c, root));
    assert!(graph.is_dependent_on(c, b));
    assert!(!graph.is_dependent_on(a, b));
    assert!(!graph.is_dependent_on(a, a));
}

#[test]
fn test_find_cycle() {
    let (mut graph, [_, a, _, c]) = diamond();
    assert!(graph.find_cycle().is_none());
    assert!(graph.topological_order().is_ok());

    graph.add_dependency(a, c).unwrap();
    assert!(graph.find_cycle().is_some());
    assert!(matches!(graph.topological_order(), Err(GraphError::Cycle(_))));
}

// ============================================================================
// Cloning Tests
// ============================================================================

#[test]
fn test_clone_with_relationships_is_deep() {
    let (graph, _) = diamond();
    let mut clone = graph.clone_with_relationships();

    let c = clone.index_of("c").unwrap();
    clone
        .node_mut(c)
        .and_then(|n| n.as_network_mut())
        .unwrap()
        .set_transfer_size(123_456);
    clone.remove_all_dependencies(c);

    let original_c = graph.index_of("c").unwrap();
    assert_eq!(
        graph[original_c].as_network().unwrap().transfer_size(),
        None
    );
    assert_eq!(graph.dependencies(original_c).len(), 2);
    assert_eq!(clone[c].as_network().unwrap().transfer_size(), Some(123_456));
}

#[test]
fn test_clone_preserves_edges() {
    let (graph, _) = diamond();
    let clone = graph.clone_with_relationships();
    assert_eq!(clone.len(), graph.len());
    assert_eq!(clone.edge_count(), graph.edge_count());

    let c = clone.index_of("c").unwrap();
    let mut dependency_ids: Vec<&str> = clone
        .dependencies(c)
        .into_iter()
        .map(|d| clone[d].id())
        .collect();
    dependency_ids.sort();
    assert_eq!(dependency_ids, vec!["a", "b"]);
}

#[test]
fn test_clone_with_filter_keeps_dependencies() {
    let (mut graph, [_, a, ..]) = diamond();
    let task = graph
        .add_node(Node::cpu("task", CpuNode::new(10.0, 5.0)))
        .unwrap();
    graph.add_dependency(task, a).unwrap();

    let clone = graph.clone_with_filter(|node| node.is_cpu());
    let mut ids: Vec<&str> = clone.nodes().map(|(_, n)| n.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "root", "task"]);
    assert_eq!(clone.main_document().id(), "root");
}

#[test]
fn test_clones_keep_nodes_without_a_path_from_the_root() {
    let (mut graph, _) = diamond();
    let orphan = graph.add_node(request("orphan", "https://cdn.example.com/o.js")).unwrap();
    let child = graph
        .add_node(Node::cpu("child", CpuNode::new(10.0, 5.0)))
        .unwrap();
    graph.add_dependency(child, orphan).unwrap();

    let full = graph.clone_with_relationships();
    assert_eq!(full.len(), graph.len());
    let cloned_child = full.index_of("child").unwrap();
    assert_eq!(full[full.dependencies(cloned_child)[0]].id(), "orphan");

    let filtered = graph.clone_with_filter(|node| node.is_cpu());
    assert!(filtered.index_of("orphan").is_some());
    assert!(filtered.index_of("child").is_some());
}

#[test]
fn test_clone_with_filter_always_keeps_root() {
    let (graph, _) = diamond();
    let clone = graph.clone_with_filter(|_| false);
    assert_eq!(clone.len(), 1);
    assert_eq!(clone.main_document().id(), "root");
}

#[test]
fn test_node_kind_accessors() {
    let (mut graph, [_, a, ..]) = diamond();
    let task = graph
        .add_node(Node::cpu("task", CpuNode::new(10.0, 5.0)))
        .unwrap();
    graph.add_dependency(task, a).unwrap();

    assert_eq!(graph.network_nodes().count(), 4);
    assert_eq!(graph.cpu_nodes().count(), 1);
    assert_eq!(graph[task].kind_name(), "cpu");
    assert_eq!(graph[task].end_time(), 15.0);
    assert!(graph[task].url().is_none());
}
