pub mod client;

pub use client::CacheClient;
