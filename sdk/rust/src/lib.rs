//! Thin client for the LLM provider gateway HTTP API.

pub mod client;

pub use client::{GatewayClient, GenerateRequest, GenerateResponse, GenerationPayload, SdkError};
