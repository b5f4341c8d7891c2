//! Keys of the persisted client settings.

/// Auth token.
pub const TOKEN: &str = "token";
/// Id of the active tenant.
pub const TENANT_ID: &str = "tenant_id";
/// JSON snapshot of the active tenant.
pub const CURRENT_TENANT: &str = "current_tenant";
/// Id of the active conversation.
pub const CHAT_ID: &str = "chat_id";
/// Whether reasoning is streamed and shown.
pub const THINK_MODE: &str = "think_mode";
/// Session language (`zh` or `en`).
pub const LANGUAGE: &str = "language";

