//! Streaming chat session: wire protocol, transcript model, socket ownership
//! and the coordinator that ties them together.

pub mod accumulator;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod types;

pub use accumulator::StreamAccumulator;
pub use config::ChatConfig;
pub use connection::{
    CloseReason, ConnectionEvent, ConnectionId, ConnectionManager, ConnectionState,
};
pub use coordinator::{SessionCoordinator, SessionEvent, SessionPhase, SessionSnapshot};
pub use error::{ChatError, ChatResult};
pub use protocol::{ParsedDelta, decode_frame};
pub use types::{
    AssistantTurn, ChatRequest, ConversationTurn, Language, TurnStatus, UserTurn, new_chat_id,
};
