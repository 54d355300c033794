// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InteropError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{kind} {id} is not registered")]
    NotRegistered { kind: &'static str, id: String },
    #[error("Chain {0} is already registered")]
    DuplicateChain(String),
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Protocol mismatch for {chain_id}: expected {expected}, found {found}")]
    ProtocolMismatch {
        chain_id: String,
        expected: String,
        found: String,
    },
    #[error("Bridge {0} not found")]
    BridgeNotFound(String),
    #[error("Channel {channel_id} not found on bridge {bridge_id}")]
    ChannelNotFound {
        bridge_id: String,
        channel_id: String,
    },
    #[error("Message {message_id} from {source_chain_id} to {dest_chain_id} already exists with status {status}")]
    DuplicateMessage {
        message_id: String,
        source_chain_id: String,
        dest_chain_id: String,
        status: String,
    },
    #[error("Chain {0} is deactivated")]
    ChainInactive(String),
    // Network failure, timeout or 5xx from the remote chain API. Safe to retry.
    #[error("Transient error from chain {chain_id} (message {message_id}): {reason}")]
    RemoteTransient {
        chain_id: String,
        message_id: String,
        reason: String,
    },
    // 4xx from the remote chain API. Never retried.
    #[error("Chain {chain_id} rejected message {message_id} with status {status}: {reason}")]
    RemoteRejected {
        chain_id: String,
        message_id: String,
        status: u16,
        reason: String,
    },
    #[error("Malformed response from chain {chain_id}: {reason}")]
    MalformedResponse { chain_id: String, reason: String },
    #[error("Interoperability is not enabled")]
    InteropDisabled,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("{0}")]
    Generic(String),
}

pub type InteropResult<T> = Result<T, InteropError>;

impl InteropError {
    pub fn not_registered(kind: &'static str, id: impl Into<String>) -> Self {
        InteropError::NotRegistered {
            kind,
            id: id.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, InteropError::RemoteTransient { .. })
    }

    // Fills in the message id on remote errors raised before the id was known.
    pub fn with_message_id(self, id: &str) -> Self {
        match self {
            InteropError::RemoteTransient {
                chain_id,
                message_id,
                reason,
            } if message_id.is_empty() => InteropError::RemoteTransient {
                chain_id,
                message_id: id.to_string(),
                reason,
            },
            InteropError::RemoteRejected {
                chain_id,
                message_id,
                status,
                reason,
            } if message_id.is_empty() => InteropError::RemoteRejected {
                chain_id,
                message_id: id.to_string(),
                status,
                reason,
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            InteropError::Validation(_)
            | InteropError::InvalidEndpoint { .. }
            | InteropError::ProtocolMismatch { .. }
            | InteropError::ChainInactive(_)
            | InteropError::InteropDisabled => StatusCode::BAD_REQUEST,
            InteropError::NotRegistered { .. }
            | InteropError::BridgeNotFound(_)
            | InteropError::ChannelNotFound { .. } => StatusCode::NOT_FOUND,
            InteropError::DuplicateChain(_) | InteropError::DuplicateMessage { .. } => {
                StatusCode::CONFLICT
            }
            InteropError::RemoteTransient { .. }
            | InteropError::RemoteRejected { .. }
            | InteropError::MalformedResponse { .. }
            | InteropError::Storage(_)
            | InteropError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            InteropError::Validation(_) => "VALIDATION_ERROR",
            InteropError::NotRegistered { .. } => "NOT_REGISTERED",
            InteropError::DuplicateChain(_) => "DUPLICATE_CHAIN",
            InteropError::DuplicateMessage { .. } => "DUPLICATE_MESSAGE",
            InteropError::InvalidEndpoint { .. } => "INVALID_ENDPOINT",
            InteropError::ProtocolMismatch { .. } => "PROTOCOL_MISMATCH",
            InteropError::BridgeNotFound(_) => "BRIDGE_NOT_FOUND",
            InteropError::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            InteropError::ChainInactive(_) => "CHAIN_INACTIVE",
            InteropError::RemoteTransient { .. } => "REMOTE_TRANSIENT",
            InteropError::RemoteRejected { .. } => "REMOTE_REJECTED",
            InteropError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            InteropError::InteropDisabled => "INTEROP_DISABLED",
            InteropError::Storage(_) => "STORAGE_ERROR",
            InteropError::Generic(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub retryable: bool,
}

impl IntoResponse for InteropError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            retryable: self.is_retryable(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
