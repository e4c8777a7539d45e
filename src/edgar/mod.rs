// src/edgar/mod.rs
pub mod client;
pub mod models;

pub use client::{DocumentProvider, SecApiClient};
