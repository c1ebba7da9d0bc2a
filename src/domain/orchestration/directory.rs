use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use std::future::Future;

use actix::prelude::Addr;

use crate::domain::orchestration::node_task::NodeTask;
use crate::domain::orchestration::node_task::messages::NodeTaskPatch;
use crate::domain::utils::id::TaskAddress;
use crate::error::{Error, Result};

/// Thread-safe handle mapping TaskAddress -> running node task.
/// Node tasks use it to reach their dependents by address.
#[derive(Clone, Debug, Default)]
pub struct TaskDirectory {
    directory: Arc<RwLock<HashMap<TaskAddress, Addr<NodeTask>>>>,
}

impl TaskDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: TaskAddress, addr: Addr<NodeTask>) {
        let mut map = match self.directory.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.insert(address.clone(), addr).is_some() {
            log::warn!("Task {} was registered twice, the previous registration is replaced.", address);
        }
    }

    pub fn lookup(&self, address: &TaskAddress) -> Option<Addr<NodeTask>> {
        let map = match self.directory.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(address).cloned()
    }

    pub fn unregister(&self, address: &TaskAddress) {
        let mut map = match self.directory.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(address);
    }

    /// Sends `patch` to the task at `target` and resolves once it was acknowledged.
    pub fn deliver(&self, target: &TaskAddress, patch: NodeTaskPatch) -> impl Future<Output = Result<()>> + 'static {
        let mailbox = self.lookup(target);
        let target = target.clone();
        async move {
            let Some(mailbox) = mailbox else {
                return Err(Error::NotificationDeliveryFailure { target, reason: "task is not registered".to_string() });
            };
            match mailbox.send(patch).await {
                Ok(acknowledged) => acknowledged.map_err(|e| Error::NotificationDeliveryFailure { target, reason: e.to_string() }),
                Err(e) => Err(Error::NotificationDeliveryFailure { target, reason: e.to_string() }),
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.directory.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Picks the first failed delivery out of a fan-out and logs the others.
pub fn first_delivery_failure(owner: &TaskAddress, results: Vec<Result<()>>) -> Option<Error> {
    let mut first_failure = None;
    for result in results {
        if let Err(e) = result {
            if first_failure.is_none() {
                first_failure = Some(e);
            } else {
                log::warn!("Task {}: further notification failure: {}", owner, e);
            }
        }
    }
    first_failure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_delivery_to_unknown_task_fails() {
        let directory = TaskDirectory::new();
        let target = TaskAddress::sub_task("req", "missing");

        let result = directory.deliver(&target, NodeTaskPatch::execute()).await;
        match result {
            Err(Error::NotificationDeliveryFailure { target: t, .. }) => assert_eq!(t, target),
            other => panic!("unexpected delivery result: {:?}", other),
        }
        assert!(directory.is_empty());
    }

    #[test]
    fn test_first_delivery_failure_keeps_first() {
        let owner = TaskAddress::sub_task("req", "owner");
        let results = vec![
            Ok(()),
            Err(Error::NotificationDeliveryFailure { target: TaskAddress::new("/a"), reason: "gone".into() }),
            Err(Error::NotificationDeliveryFailure { target: TaskAddress::new("/b"), reason: "gone".into() }),
        ];
        match first_delivery_failure(&owner, results) {
            Some(Error::NotificationDeliveryFailure { target, .. }) => assert_eq!(target.as_str(), "/a"),
            other => panic!("unexpected failure: {:?}", other),
        }
        assert!(first_delivery_failure(&owner, vec![Ok(()), Ok(())]).is_none());
    }
}
