use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HandlerError, RegistryError};
use crate::ports::ActivityHandler;

/// Registry of activity handlers (activity name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
///
/// The registry is itself an `ActivityHandler`, so a worker can be given
/// either one handler or a whole registry.
#[derive(Default)]
pub struct ActivityRegistry {
    handlers: HashMap<String, Arc<dyn ActivityHandler>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        activity: impl Into<String>,
        handler: Arc<dyn ActivityHandler>,
    ) -> Result<(), RegistryError> {
        let activity = activity.into();
        if self.handlers.contains_key(&activity) {
            return Err(RegistryError::AlreadyRegistered(activity));
        }
        self.handlers.insert(activity, handler);
        Ok(())
    }

    pub fn get(&self, activity: &str) -> Option<&Arc<dyn ActivityHandler>> {
        self.handlers.get(activity)
    }

    pub fn registered_activities(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ActivityHandler for ActivityRegistry {
    async fn handle(&self, activity: &str, input: &str) -> Result<String, HandlerError> {
        let handler = self
            .get(activity)
            .ok_or_else(|| HandlerError::HandlerNotFound(activity.to_string()))?;
        handler.handle(activity, input).await
    }
}
