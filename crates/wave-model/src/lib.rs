// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Model boundary of the Wave agent core: OpenAI-shaped wire types, the
//! [`ChatProvider`] trait, a default HTTP provider, and the cancel-token
//! abstraction shared by the model call and tool executions.

pub mod cancel;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod types;

pub use cancel::{CancelToken, CancelledError};
pub use mock::{MockProvider, ScriptedProvider};
pub use openai::OpenAiProvider;
pub use provider::ChatProvider;
pub use types::{
    ApiContent, ApiContentPart, ApiFunctionCall, ApiMessage, ApiRole, ApiToolCall, ApiUsage,
    ChatCompletion, ChatRequest, ToolSchema,
};
