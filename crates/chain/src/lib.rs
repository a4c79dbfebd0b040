//! NEO JSON-RPC adapter for the Argus scraper.
//!
//! This crate implements the `NodeRpc` port defined in `argus-core` over
//! HTTP JSON-RPC: `getblockcount` and `getblock` for ingestion, and
//! `invokefunction` / `getapplicationlog` for NEP5 contract queries and
//! transfer extraction.

mod client;
mod dto;

pub use client::{NeoRpcClient, NeoRpcConfig};
