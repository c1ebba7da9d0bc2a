use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use crate::domain::composition::component::{ComponentDescription, DependencyResolver};
use crate::domain::utils::id::DescriptionLink;
use crate::error::{CycleDetection, Error, Result};

/// One buildable unit of a composition together with its position in the dependency graph.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub name: String,
    pub description_link: DescriptionLink,
    pub resource_type: String,

    /// Breadth-first depth. 1 means no dependencies.
    pub level: u32,

    /// Names of the nodes this node waits for.
    pub depends_on: BTreeSet<String>,

    /// Names of the nodes waiting for this node.
    pub dependents: BTreeSet<String>,
}

impl ResourceNode {
    fn from_component(component: &ComponentDescription) -> Self {
        Self {
            name: component.name.clone(),
            description_link: component.description_link.clone(),
            resource_type: component.resource_type.clone(),
            level: 0,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }
}

impl PartialEq for ResourceNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.description_link == other.description_link
    }
}

impl Eq for ResourceNode {}

impl Hash for ResourceNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.description_link.hash(state);
    }
}

/// Dependency graph of the components of one composition request.
#[derive(Debug, Clone, Default)]
pub struct CompositionGraph {
    resource_nodes_by_name: BTreeMap<String, ResourceNode>,

    /// Node names in topological order.
    order: Vec<String>,
}

/// Calculates the execution order of `components`.
///
/// Returns the resource nodes in a valid topological order. Nodes with the same level have no
/// defined relative order and are independent of each other.
pub fn build_graph(components: &[ComponentDescription], resolver: &dyn DependencyResolver) -> Result<Vec<ResourceNode>> {
    Ok(CompositionGraph::calculate(components, resolver)?.into_ordered_nodes())
}

impl CompositionGraph {
    /// Builds the graph and computes the topological order.
    ///
    /// Fails with `DuplicateName` if two components share a name, with `UnresolvedDependency` if a
    /// dependency names no component, and with `CyclicDependency` if the graph has a cycle.
    pub fn calculate(components: &[ComponentDescription], resolver: &dyn DependencyResolver) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::InvalidRequest("component descriptions must not be empty".to_string()));
        }

        // Phase 1: One node per component
        let mut nodes = Self::populate_resource_nodes_by_name(components)?;

        // Phase 2: Ask the resolver which nodes each node depends on
        Self::calculate_depends_on(&mut nodes, components, resolver)?;

        // Phase 3: Invert the edges
        Self::calculate_dependents(&mut nodes);

        // Phase 4: Seed with first level nodes and consume breadth first
        let order = Self::topological_sort(&mut nodes)?;

        let graph = Self { resource_nodes_by_name: nodes, order };
        log::debug!("Composition graph calculated with {} nodes over {} levels: {:?}", graph.order.len(), graph.max_level(), graph.order);

        Ok(graph)
    }

    /// **Phase 1: Populate Resource Nodes**
    fn populate_resource_nodes_by_name(components: &[ComponentDescription]) -> Result<BTreeMap<String, ResourceNode>> {
        let mut nodes: BTreeMap<String, ResourceNode> = BTreeMap::new();

        for component in components {
            let node = ResourceNode::from_component(component);
            if let Some(previous) = nodes.insert(node.name.clone(), node) {
                return Err(Error::DuplicateName {
                    name: component.name.clone(),
                    first: previous.description_link.to_string(),
                    second: component.description_link.to_string(),
                });
            }
        }
        Ok(nodes)
    }

    /// **Phase 2: Calculate DependsOn**
    fn calculate_depends_on(
        nodes: &mut BTreeMap<String, ResourceNode>,
        components: &[ComponentDescription],
        resolver: &dyn DependencyResolver,
    ) -> Result<()> {
        for component in components {
            let dependencies = resolver.dependencies(component, components);
            for dependency in &dependencies {
                if !nodes.contains_key(dependency) {
                    return Err(Error::UnresolvedDependency { dependency: dependency.clone(), component: component.name.clone() });
                }
            }
            if let Some(node) = nodes.get_mut(&component.name) {
                node.depends_on = dependencies;
            }
        }
        Ok(())
    }

    /// **Phase 3: Calculate Dependents**
    fn calculate_dependents(nodes: &mut BTreeMap<String, ResourceNode>) {
        let edges: Vec<(String, String)> =
            nodes.values().flat_map(|n| n.depends_on.iter().map(move |d| (d.clone(), n.name.clone()))).collect();

        for (dependency, dependent) in edges {
            if let Some(node) = nodes.get_mut(&dependency) {
                node.dependents.insert(dependent);
            }
        }
    }

    /// **Phase 4: Topological Sort (Kahn)**
    ///
    /// Every node is released once all of its dependencies were consumed and gets the level of
    /// the releasing node plus one.
    fn topological_sort(nodes: &mut BTreeMap<String, ResourceNode>) -> Result<Vec<String>> {
        let mut remaining: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for node in nodes.values_mut() {
            if node.depends_on.is_empty() {
                node.level = 1;
                queue.push_back(node.name.clone());
            } else {
                remaining.insert(node.name.clone(), node.depends_on.clone());
            }
        }

        // At least one node without dependencies is needed to start
        if queue.is_empty() {
            return Err(Error::CyclicDependency(CycleDetection::NoEntryNode));
        }

        let mut processed: Vec<String> = Vec::with_capacity(nodes.len());
        let mut processed_set: HashSet<String> = HashSet::with_capacity(nodes.len());

        while let Some(top_name) = queue.pop_front() {
            let (top_level, dependents) = match nodes.get(&top_name) {
                Some(top) => (top.level, top.dependents.clone()),
                None => continue,
            };
            processed_set.insert(top_name.clone());
            processed.push(top_name.clone());

            for dependent_name in dependents {
                let Some(waiting_for) = remaining.get_mut(&dependent_name) else {
                    continue;
                };
                waiting_for.remove(&top_name);

                if waiting_for.is_empty() {
                    if processed_set.contains(&dependent_name) {
                        return Err(Error::CyclicDependency(CycleDetection::DuringProcessing));
                    }
                    if let Some(dependent) = nodes.get_mut(&dependent_name) {
                        dependent.level = top_level + 1;
                    }
                    queue.push_back(dependent_name);
                }
            }
        }

        if processed.len() != nodes.len() {
            return Err(Error::CyclicDependency(CycleDetection::AfterProcessing));
        }

        Ok(processed)
    }

    pub fn into_ordered_nodes(mut self) -> Vec<ResourceNode> {
        self.order.iter().filter_map(|name| self.resource_nodes_by_name.remove(name)).collect()
    }

    fn max_level(&self) -> u32 {
        self.resource_nodes_by_name.values().map(|n| n.level).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::composition::component::{DeclaredDependencyResolver, FnResolver};
    use crate::domain::resource_type::ResourceType;

    fn container(name: &str, deps: &[&str]) -> ComponentDescription {
        ComponentDescription::new(name, ResourceType::Container).depending_on(deps.iter().copied())
    }

    fn position(order: &[ResourceNode], name: &str) -> usize {
        order.iter().position(|n| n.name == name).unwrap()
    }

    fn assert_topological(order: &[ResourceNode]) {
        for node in order {
            for dep in &node.depends_on {
                assert!(position(order, dep) < position(order, &node.name), "{} must come after {}", node.name, dep);
            }
        }
    }

    #[test]
    fn test_three_components_chain_levels() {
        let components = vec![container("C", &["A", "B"]), container("B", &["A"]), container("A", &[])];
        let order = build_graph(&components, &DeclaredDependencyResolver).unwrap();

        let names: Vec<&str> = order.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        let levels: Vec<u32> = order.iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![1, 2, 3]);

        let a = &order[0];
        let expected: BTreeSet<String> = ["B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(a.dependents, expected);
    }

    #[test]
    fn test_two_node_cycle() {
        let components = vec![container("X", &["Y"]), container("Y", &["X"])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(CycleDetection::NoEntryNode)));
    }

    #[test]
    fn test_cycle_behind_entry_node() {
        // A is an entry node, B -> C -> D -> B is a cycle reachable from it.
        let components = vec![container("A", &[]), container("B", &["A", "D"]), container("C", &["B"]), container("D", &["C"])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        assert!(err.is_cyclic_dependency());
    }

    #[test]
    fn test_disjoint_cyclic_subgraph() {
        let components = vec![container("A", &[]), container("B", &["A"]), container("X", &["Y"]), container("Y", &["X"])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(CycleDetection::AfterProcessing)));
    }

    #[test]
    fn test_self_reference_through_resolver_is_cyclic() {
        let components = vec![container("A", &[]), container("B", &[])];
        let resolver = FnResolver(|c: &ComponentDescription| {
            let mut deps = BTreeSet::new();
            if c.name == "B" {
                deps.insert("B".to_string());
            }
            deps
        });
        let err = build_graph(&components, &resolver).unwrap_err();
        assert!(err.is_cyclic_dependency());
    }

    #[test]
    fn test_duplicate_names() {
        let components = vec![container("A", &[]), container("A", &[])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { ref name, .. } if name == "A"));

        // Duplicates win over cycles
        let components = vec![container("A", &["B"]), container("B", &["A"]), container("B", &[])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
    }

    #[test]
    fn test_unresolved_dependency() {
        let components = vec![container("A", &["missing"])];
        let err = build_graph(&components, &DeclaredDependencyResolver).unwrap_err();
        match err {
            Error::UnresolvedDependency { dependency, component } => {
                assert_eq!(dependency, "missing");
                assert_eq!(component, "A");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_components_rejected() {
        assert!(matches!(build_graph(&[], &DeclaredDependencyResolver), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_diamond_levels_and_order() {
        // net <- web, net <- db, web <- lb, db <- lb, vol <- db
        let mut net = ComponentDescription::new("net", ResourceType::Network);
        net.description_link = DescriptionLink::new("/resources/network-descriptions/net");
        let vol = ComponentDescription::new("vol", ResourceType::Volume);
        let mut web = container("web", &[]);
        web.networks = vec!["net".to_string()];
        let mut db = container("db", &[]);
        db.networks = vec!["net".to_string()];
        db.volumes = vec!["vol:/data".to_string()];
        let mut lb = container("lb", &[]);
        lb.links = vec!["web".to_string(), "db:database".to_string()];

        let graph = CompositionGraph::calculate(&[lb, db, web, vol, net], &DeclaredDependencyResolver).unwrap();
        let levels: HashMap<&str, u32> = graph.resource_nodes_by_name.values().map(|n| (n.name.as_str(), n.level)).collect();

        assert_eq!(levels["net"], 1);
        assert_eq!(levels["vol"], 1);
        assert_eq!(levels["web"], 2);
        assert_eq!(levels["db"], 2);
        assert_eq!(levels["lb"], 3);
        assert_eq!(graph.max_level(), 3);
        assert_eq!(levels.values().filter(|level| **level == 2).count(), 2);

        let order = graph.into_ordered_nodes();
        assert_eq!(order.len(), 5);
        assert_topological(&order);
    }

    #[test]
    fn test_wide_random_dag_is_topological() {
        // Each node i depends on every node j < i with j % 3 == i % 3.
        let components: Vec<ComponentDescription> = (0..30)
            .map(|i| {
                let deps: Vec<String> = (0..i).filter(|j| j % 3 == i % 3).map(|j| format!("n{}", j)).collect();
                ComponentDescription::new(format!("n{}", i), ResourceType::Container).depending_on(deps)
            })
            .collect();

        let order = build_graph(&components, &DeclaredDependencyResolver).unwrap();
        assert_eq!(order.len(), 30);
        assert_topological(&order);

        for node in &order {
            let expected = if node.depends_on.is_empty() {
                1
            } else {
                node.depends_on.iter().map(|d| order[position(&order, d)].level).max().unwrap() + 1
            };
            assert_eq!(node.level, expected, "level of {}", node.name);
        }
    }

    #[test]
    fn test_node_equality_uses_name_and_description() {
        let a = ResourceNode::from_component(&container("A", &[]));
        let mut b = a.clone();
        b.level = 7;
        assert_eq!(a, b);
        b.description_link = DescriptionLink::new("/other");
        assert_ne!(a, b);
    }
}
