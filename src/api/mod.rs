//! REST collaborator of the chat session: model, tenant and history listing.

pub mod client;
pub mod models;

pub use client::{ApiFuture, ChatApi, HttpChatApi};
pub use models::{ApiResponse, ChatHistory, ChatModel, Tenant, TenantStatus};
