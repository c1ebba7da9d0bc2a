use std::collections::{BTreeMap, BTreeSet};

use crate::domain::resource_type::ResourceType;
use crate::domain::utils::id::DescriptionLink;

/// Key of the custom property carrying the request scoped context id.
pub const CONTEXT_ID_PROPERTY: &str = "__composition_context_id";

/// One component of a composite description, already expanded and binding-evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDescription {
    /// Unique per composition.
    pub name: String,
    pub resource_type: String,
    pub description_link: DescriptionLink,

    /// Template-time variable bindings. Evaluated before the description reaches the graph builder.
    pub bindings: BTreeMap<String, String>,

    /// Explicit affinity constraints.
    pub depends_on: Vec<String>,
    /// Service links in the form `service[:alias]`.
    pub links: Vec<String>,
    pub networks: Vec<String>,
    /// Volume mounts in the form `source:/container/path[:mode]`.
    pub volumes: Vec<String>,

    pub custom_properties: BTreeMap<String, String>,
}

impl ComponentDescription {
    pub fn new(name: impl Into<String>, resource_type: ResourceType) -> Self {
        let name = name.into();
        let description_link = DescriptionLink::new(format!("/resources/{}-descriptions/{}", resource_type, name));
        Self {
            name,
            resource_type: resource_type.name().to_string(),
            description_link,
            bindings: BTreeMap::new(),
            depends_on: Vec::new(),
            links: Vec::new(),
            networks: Vec::new(),
            volumes: Vec::new(),
            custom_properties: BTreeMap::new(),
        }
    }

    pub fn depending_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A composite description: the unit a composition request provisions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeDescription {
    pub link: DescriptionLink,
    pub name: String,
    pub tenant_links: Vec<String>,
    pub custom_properties: BTreeMap<String, String>,
    /// Empty when the description was fetched without expansion.
    pub components: Vec<ComponentDescription>,
}

/// Decides which other components a component depends on (affinity and implicit dependency rules).
pub trait DependencyResolver: Send + Sync {
    fn dependencies(&self, component: &ComponentDescription, siblings: &[ComponentDescription]) -> BTreeSet<String>;
}

/// Adapts a plain function of the component to a `DependencyResolver`.
pub struct FnResolver<F>(pub F);

impl<F> DependencyResolver for FnResolver<F>
where
    F: Fn(&ComponentDescription) -> BTreeSet<String> + Send + Sync,
{
    fn dependencies(&self, component: &ComponentDescription, _siblings: &[ComponentDescription]) -> BTreeSet<String> {
        (self.0)(component)
    }
}

/// Resolves dependencies from what the components declare.
///
/// Explicit: `depends_on` and the service part of `links`; these must name a component of the
/// composition. Implicit: a network or a named volume source that matches a network/volume
/// component of the same composition.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredDependencyResolver;

impl DependencyResolver for DeclaredDependencyResolver {
    fn dependencies(&self, component: &ComponentDescription, siblings: &[ComponentDescription]) -> BTreeSet<String> {
        let mut dependencies: BTreeSet<String> = component.depends_on.iter().cloned().collect();

        for link in &component.links {
            let service = link.split(':').next().unwrap_or(link).trim();
            if !service.is_empty() {
                dependencies.insert(service.to_string());
            }
        }

        let sibling_of_type = |name: &str, typ: ResourceType| {
            siblings.iter().any(|s| s.name == name && s.resource_type.eq_ignore_ascii_case(typ.name()))
        };

        for network in &component.networks {
            if sibling_of_type(network, ResourceType::Network) || sibling_of_type(network, ResourceType::ComputeNetwork) {
                dependencies.insert(network.clone());
            }
        }

        for volume in &component.volumes {
            let source = volume.split(':').next().unwrap_or(volume);
            if sibling_of_type(source, ResourceType::Volume) {
                dependencies.insert(source.to_string());
            }
        }

        dependencies.remove(&component.name);
        dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_resolver_explicit_and_implicit() {
        let net = ComponentDescription::new("backend", ResourceType::Network);
        let vol = ComponentDescription::new("data", ResourceType::Volume);
        let mut web = ComponentDescription::new("web", ResourceType::Container).depending_on(["cache"]);
        web.links = vec!["db:database".to_string()];
        web.networks = vec!["backend".to_string(), "external-net".to_string()];
        web.volumes = vec!["data:/var/lib/data".to_string(), "/tmp:/tmp".to_string()];

        let siblings = vec![net, vol, web.clone()];
        let deps = DeclaredDependencyResolver.dependencies(&web, &siblings);

        let expected: BTreeSet<String> = ["cache", "db", "backend", "data"].iter().map(|s| s.to_string()).collect();
        assert_eq!(deps, expected);
    }

    #[test]
    fn test_fn_resolver_delegates() {
        let resolver = FnResolver(|c: &ComponentDescription| c.depends_on.iter().cloned().collect::<BTreeSet<_>>());
        let c = ComponentDescription::new("a", ResourceType::Container).depending_on(["b"]);
        assert_eq!(resolver.dependencies(&c, &[]).len(), 1);
    }
}
