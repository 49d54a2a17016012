//! Provider specific [`CompletionClient`](crate::client_wrapper::CompletionClient) implementations.
//!
//! Each submodule offers a concrete client that speaks a particular vendor's API while
//! conforming to the uniform conclave contract.

pub mod common;

pub mod openrouter;
