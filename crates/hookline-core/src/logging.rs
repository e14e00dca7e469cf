//! `Logger` capability: a small trait decoupling the bus and delivery
//! pipeline from any one logging backend, with a `tracing`-backed default.

/// Logging capability consumed by the event bus, delivery queue, and
/// webhook service. Implementations must be cheap to clone and safe to
/// call from any worker thread.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Default `Logger` forwarding to the `tracing` crate's macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
    }
}
