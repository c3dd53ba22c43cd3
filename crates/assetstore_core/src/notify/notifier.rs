//! Synchronous fan-out of domain events to registered handlers.
//!
//! # Responsibility
//! - Keep the ordered handler registration list.
//! - Deliver every event to every handler and collect failures.
//!
//! # Invariants
//! - Delivery order is event-major, then registration order.
//! - A failing or panicking handler never prevents delivery to later
//!   handlers or of later events.
//! - Handler names are unique within one notifier.

use crate::model::event::AssetEvent;
use log::{debug, warn};
use parking_lot::RwLock;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

const MAX_FAILURE_MESSAGE_CHARS: usize = 200;

/// Observer of store mutations.
///
/// Runs while the mutated packages are still locked; mutating those same
/// packages from `execute` deadlocks.
pub trait AssetEventHandler: Send + Sync {
    /// Stable, unique handler name used in failure reports.
    fn name(&self) -> &str;
    /// Handles one event. Called on the mutating caller's thread.
    fn execute(&self, event: &AssetEvent) -> Result<(), HandlerError>;
}

/// Error returned by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for HandlerError {}

/// One handler failing on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub handler: String,
    pub event: AssetEvent,
    pub error: HandlerError,
}

impl Display for DeliveryFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "handler `{}` failed on {} for {}: {}",
            self.handler,
            self.event.kind(),
            self.event.media_package_id(),
            self.error
        )
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    InvalidHandlerName(String),
    DuplicateHandler(String),
}

impl Display for NotifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandlerName(value) => write!(f, "handler name is invalid: `{value}`"),
            Self::DuplicateHandler(value) => write!(f, "handler already registered: {value}"),
        }
    }
}

impl Error for NotifierError {}

/// Ordered handler list with aggregate-failure delivery.
#[derive(Default)]
pub struct ChangeNotifier {
    handlers: RwLock<Vec<Arc<dyn AssetEventHandler>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the delivery order.
    pub fn register(&self, handler: Arc<dyn AssetEventHandler>) -> Result<(), NotifierError> {
        let name = handler.name().trim().to_string();
        if name.is_empty() {
            return Err(NotifierError::InvalidHandlerName(name));
        }

        let mut handlers = self.handlers.write();
        if handlers.iter().any(|existing| existing.name().trim() == name) {
            return Err(NotifierError::DuplicateHandler(name));
        }
        handlers.push(handler);
        debug!("event=handler_register module=notify status=ok handler={name}");
        Ok(())
    }

    /// Removes a handler by name. Returns whether one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let name = name.trim();
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|handler| handler.name().trim() != name);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Registered handler names in delivery order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|handler| handler.name().trim().to_string())
            .collect()
    }

    /// Delivers one event to every handler.
    pub fn deliver(&self, event: &AssetEvent) -> Vec<DeliveryFailure> {
        self.deliver_all(std::slice::from_ref(event))
    }

    /// Delivers `events` in order to every handler, collecting failures.
    pub fn deliver_all(&self, events: &[AssetEvent]) -> Vec<DeliveryFailure> {
        // Registration changes during delivery apply to the next mutation.
        let handlers = self.handlers.read().clone();
        let mut failures = Vec::new();

        for event in events {
            for handler in &handlers {
                if let Err(error) = invoke(handler.as_ref(), event) {
                    warn!(
                        "event=handler_delivery module=notify status=error handler={} event_type={} error={}",
                        handler.name(),
                        event.kind(),
                        error
                    );
                    failures.push(DeliveryFailure {
                        handler: handler.name().to_string(),
                        event: event.clone(),
                        error,
                    });
                }
            }
        }

        debug!(
            "event=deliver module=notify status={} events={} handlers={} failures={}",
            if failures.is_empty() { "ok" } else { "partial" },
            events.len(),
            handlers.len(),
            failures.len()
        );
        failures
    }
}

fn invoke(handler: &dyn AssetEventHandler, event: &AssetEvent) -> Result<(), HandlerError> {
    match catch_unwind(AssertUnwindSafe(|| handler.execute(event))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(HandlerError::new(format!(
                "handler panicked: {}",
                truncate(&message, MAX_FAILURE_MESSAGE_CHARS)
            )))
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
