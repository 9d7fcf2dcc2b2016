use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency list between symbol names. An edge `a -> b` means that `b`
/// depends on `a`, so the edges leaving a node are its dependents.
///
/// A node exists for every name that was registered through
/// `add_dependencies` and for every name that has at least one dependent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencyGraph
{
    adjacency: HashMap<String, Vec<String>>,
}

impl DependencyGraph
{
    pub fn new() -> DependencyGraph
    {
        DependencyGraph::default()
    }

    /// Registers `name` as a node and adds an edge from each of `deps` to it.
    ///
    /// Self-loops are ignored. Cycles are not checked here: callers are
    /// expected to have rejected cyclic definitions beforehand.
    ///
    /// # Example
    /// ```
    /// use geqsplot::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_dependencies("c", &["a".to_owned(), "b".to_owned()]);
    ///
    /// assert_eq!(graph.dependents("a"), ["c".to_owned()]);
    /// assert!(graph.contains("c"));
    /// ```
    pub fn add_dependencies(&mut self, name: &str, deps: &[String])
    {
        self.adjacency.entry(name.to_owned()).or_default();
        for dep in deps
        {
            if dep == name
            {
                log::warn!("ignoring self-dependency of '{}'", name);
                continue;
            }
            let edges = self.adjacency.entry(dep.clone()).or_default();
            if !edges.iter().any(|d| d == name)
            {
                edges.push(name.to_owned());
            }
        }
    }

    /// Deletes the edges from each of `deps` to `name`, pruning nodes that are left without dependents.
    pub fn remove_dependencies(&mut self, name: &str, deps: &[String])
    {
        for dep in deps
        {
            if let Some(edges) = self.adjacency.get_mut(dep.as_str())
            {
                edges.retain(|d| d != name);
                if edges.is_empty()
                {
                    self.adjacency.remove(dep.as_str());
                }
            }
        }
        if self.adjacency.get(name).map_or(false, |edges| edges.is_empty())
        {
            self.adjacency.remove(name);
        }
    }

    /// Direct dependents of `name`, in the order they were registered.
    pub fn dependents(&self, name: &str) -> &[String]
    {
        self.adjacency.get(name).map_or(&[], |edges| edges.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool
    {
        self.adjacency.contains_key(name)
    }

    pub fn len(&self) -> usize
    {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.adjacency.is_empty()
    }

    /// Every transitive dependent of `name` in breadth-first discovery order, excluding `name` itself.
    pub fn reachable_from(&self, name: &str) -> Vec<String>
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(name);
        queue.push_back(name);
        while let Some(current) = queue.pop_front()
        {
            for next in self.dependents(current)
            {
                if seen.insert(next.as_str())
                {
                    order.push(next.clone());
                    queue.push_back(next.as_str());
                }
            }
        }
        order
    }

    /// Whether `to` can be reached from `from` by following dependent edges.
    pub fn has_path(&self, from: &str, to: &str) -> bool
    {
        from == to || self.reachable_from(from).iter().any(|n| n == to)
    }
}

#[test]
fn test_add_and_remove_dependencies()
{
    let mut graph = DependencyGraph::new();
    graph.add_dependencies("b", &["a".to_owned()]);
    graph.add_dependencies("c", &["a".to_owned(), "b".to_owned()]);

    assert_eq!(graph.dependents("a"), ["b".to_owned(), "c".to_owned()]);
    assert_eq!(graph.dependents("b"), ["c".to_owned()]);
    assert!(graph.contains("c"));

    graph.remove_dependencies("c", &["a".to_owned(), "b".to_owned()]);
    assert_eq!(graph.dependents("a"), ["b".to_owned()]);
    // b has no dependents left, so it is pruned
    assert!(!graph.contains("b"));
    assert!(!graph.contains("c"));
}

#[test]
fn test_self_loop_is_ignored()
{
    let mut graph = DependencyGraph::new();
    graph.add_dependencies("a", &["a".to_owned()]);
    assert!(graph.dependents("a").is_empty());
}

#[test]
fn test_reachable_from_is_breadth_first()
{
    let mut graph = DependencyGraph::new();
    graph.add_dependencies("b", &["a".to_owned()]);
    graph.add_dependencies("c", &["b".to_owned()]);
    graph.add_dependencies("d", &["a".to_owned(), "c".to_owned()]);

    assert_eq!(graph.reachable_from("a"), vec!["b", "d", "c"]);
    assert!(graph.has_path("a", "c"));
    assert!(!graph.has_path("c", "a"));
}
