//! Error handler: retry + circuit breaker + dead-letter queue (spec §4.3,
//! component C3).

mod circuit_breaker;
mod dead_letter;
mod error;
mod handler;
mod reporting;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use dead_letter::{DeadLetterEntry, DeadLetterQueue};
pub use error::ErrorHandlerError;
pub use handler::ErrorHandler;
pub use reporting::ErrorReporter;
pub use retry::RetryPolicy;
