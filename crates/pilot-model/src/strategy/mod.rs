mod jitter;
pub use jitter::JitterStrategy;

mod backoff;
pub use backoff::BackoffStrategy;
