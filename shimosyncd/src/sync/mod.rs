pub mod backoff;
pub mod comments;
pub mod convert;
pub mod engine;
pub mod index;
pub mod paths;
pub mod resolver;
pub mod transfer;
