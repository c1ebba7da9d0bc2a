use std::fmt;
use std::marker::PhantomData;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Id<T> {
    pub id: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Id { id: id.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Id::new(String::new())
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: {:?}", display_name, self.id)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct TaskTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ResourceTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct DescriptionTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ContextTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct CompositeTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct SchedulerTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct TrackerTag;

/// Address of a task instance (coordinator, node task or removal task).
pub type TaskAddress = Id<TaskTag>;
/// Link to a provisioned (or allocated) resource.
pub type ResourceLink = Id<ResourceTag>;
/// Link to a component or composite description.
pub type DescriptionLink = Id<DescriptionTag>;
pub type ContextId = Id<ContextTag>;
/// Link to the logical composite record grouping the resources of one request.
pub type CompositeLink = Id<CompositeTag>;
/// Address of a foreign orchestrator owning an externally scheduled unit.
pub type SchedulerAddress = Id<SchedulerTag>;
pub type TrackerLink = Id<TrackerTag>;

pub const COMPOSITION_TASKS_PATH: &str = "/request/composition-tasks";
pub const COMPOSITION_SUB_TASKS_PATH: &str = "/request/composition-sub-tasks";
pub const COMPOSITE_REMOVAL_TASKS_PATH: &str = "/request/composite-removal-tasks";

impl TaskAddress {
    /// Address of the sub task created by request `request_id` for the component `name`.
    pub fn sub_task(request_id: &str, name: &str) -> Self {
        TaskAddress::new(format!("{}/{}-{}", COMPOSITION_SUB_TASKS_PATH, request_id, encode_segment(name)))
    }

    pub fn composition_task(id: &str) -> Self {
        TaskAddress::new(format!("{}/{}", COMPOSITION_TASKS_PATH, id))
    }

    pub fn removal_task(id: &str) -> Self {
        TaskAddress::new(format!("{}/{}", COMPOSITE_REMOVAL_TASKS_PATH, id))
    }

    /// Last path segment of the address.
    pub fn self_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9._-]`, so distinct names never share a segment.
fn encode_segment(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_task_address_encodes_name() {
        let address = TaskAddress::sub_task("req-1", "web app");
        assert_eq!(address.as_str(), "/request/composition-sub-tasks/req-1-web%20app");
        assert_eq!(address.self_id(), "req-1-web%20app");
    }

    #[test]
    fn test_sub_task_addresses_stay_distinct() {
        let names = ["web app", "web_app", "web%20app", "web/app", "wéb"];
        let addresses: std::collections::BTreeSet<TaskAddress> = names.iter().map(|name| TaskAddress::sub_task("req-1", name)).collect();

        assert_eq!(addresses.len(), names.len());
        assert_eq!(TaskAddress::sub_task("req-1", "web/app").self_id(), "req-1-web%2Fapp");
    }

    #[test]
    fn test_debug_uses_type_name() {
        let link = ResourceLink::new("/resources/containers/a");
        assert_eq!(format!("{:?}", link), "ResourceId: \"/resources/containers/a\"");
    }
}
