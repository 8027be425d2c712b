pub mod rate_limit_gc;

pub use rate_limit_gc::RateLimitGcWorker;
