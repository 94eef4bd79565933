use std::sync::Arc;

use tracing::debug;

use super::{ports, supervisor::Supervisor};
use crate::components::{BuildContext, ComponentFactory, SessionHooks};
use crate::config::SessionConfig;
use crate::error::SupervisorError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SessionConfig,
    hooks: Option<Arc<dyn SessionHooks>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    bus_capacity: usize,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            cfg,
            hooks: None,
            subscribers: Vec::new(),
            bus_capacity: 1024,
        }
    }

    /// Sets the session policy invoked by children. Required.
    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Sets event subscribers (run log, test journals, ...).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the event bus capacity (clamped to at least 1).
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Validates the config, assigns the initial app port and builds the children.
    ///
    /// Must be called from within a tokio runtime when subscribers are set.
    pub fn build(self, factory: &dyn ComponentFactory) -> Result<Arc<Supervisor>, SupervisorError> {
        self.cfg.validate()?;
        let hooks = self
            .hooks
            .ok_or_else(|| SupervisorError::Config("session hooks are required".into()))?;
        let bus = Bus::new(self.bus_capacity);

        let app_port = match self.cfg.app_port {
            Some(pinned) => pinned,
            None => ports::random_port(&ports::reserved_ports(&self.cfg)),
        };
        debug!(app_port, pinned = self.cfg.app_port.is_some(), "initial app port");

        let children = factory.build(&BuildContext {
            config: &self.cfg,
            app_port,
            hooks: Arc::clone(&hooks),
            bus: bus.clone(),
        })?;

        Ok(Arc::new(Supervisor::new_internal(
            &self.cfg,
            app_port,
            bus,
            SubscriberSet::new(self.subscribers),
            hooks,
            children,
        )))
    }
}
