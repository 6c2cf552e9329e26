pub mod checksum;
pub mod coordinator;
pub mod fetcher;
pub mod logging;
pub mod manifest;
pub mod probe;
pub mod resolver;
pub mod retry;
