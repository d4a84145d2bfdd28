pub mod cli;
pub mod closure;
pub mod db;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod logger;
pub mod notification_service;
pub mod reconciler;
pub mod resolver;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod settings;
pub mod tracker;

#[cfg(test)]
pub mod testing;

use crate::error::LifecycleError;
use crate::gateway::GatewayError;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use diesel::PgConnection;
use diesel_migrations::embed_migrations;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::MigrationHarness;
use serde_json::json;
use serde_json::Value;
use xahau_client::LedgerError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_migration(conn: &mut PgConnection) {
    conn.run_pending_migrations(MIGRATIONS)
        .expect("migrations to succeed");
}

/// Our app's top level error type.
///
/// Every body carries a stable machine-readable `kind` plus human text so
/// the UI can distinguish warnings (unclaimed balance, recently synced)
/// from failures.
#[derive(Debug)]
pub enum AppError {
    BadRequest {
        kind: &'static str,
        message: String,
    },
    Conflict {
        kind: &'static str,
        message: String,
        data: Value,
    },
    NotFound(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message, data) = match self {
            AppError::BadRequest { kind, message } => {
                (StatusCode::BAD_REQUEST, kind, message, Value::Null)
            }
            AppError::Conflict {
                kind,
                message,
                data,
            } => (StatusCode::CONFLICT, kind, message, data),
            AppError::NotFound(message) => {
                (StatusCode::NOT_FOUND, "NotFound", message, Value::Null)
            }
            AppError::InternalServerError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal",
                message,
                Value::Null,
            ),
        };

        let mut error = serde_json::Map::new();
        error.insert("kind".to_string(), json!(kind));
        error.insert("message".to_string(), json!(message));
        if let Value::Object(extra) = data {
            error.extend(extra);
        }

        let body = Json(json!({ "error": error }));

        (status, body).into_response()
    }
}

impl From<LifecycleError> for AppError {
    fn from(e: LifecycleError) -> Self {
        let message = format!("{e:#}");
        match e {
            LifecycleError::InvalidParameters(_) => AppError::BadRequest {
                kind: "InvalidParameters",
                message,
            },
            LifecycleError::DestinationInactive(_) => AppError::BadRequest {
                kind: "DestinationInactive",
                message,
            },
            LifecycleError::UnclaimedBalance {
                unpaid_balance,
                caller_kind,
            } => AppError::Conflict {
                kind: "UnclaimedBalance",
                message,
                data: json!({
                    "unpaid_balance": unpaid_balance,
                    "caller_kind": caller_kind,
                }),
            },
            LifecycleError::ChannelIdUnresolved { ref tx_hash } => AppError::Conflict {
                kind: "ChannelIdUnresolved",
                message: message.clone(),
                data: json!({ "tx_hash": tx_hash }),
            },
            LifecycleError::TransactionNotFinal { ref tx_hash } => AppError::Conflict {
                kind: "TransactionNotFinal",
                message: message.clone(),
                data: json!({ "tx_hash": tx_hash }),
            },
            LifecycleError::TransactionFailed { ref code } => AppError::Conflict {
                kind: "TransactionFailed",
                message: message.clone(),
                data: json!({ "engine_result": code }),
            },
            LifecycleError::ChannelStateUnexpected(_) => AppError::Conflict {
                kind: "ChannelStateUnexpected",
                message,
                data: Value::Null,
            },
            LifecycleError::NoSuchChannel(_) | LifecycleError::NoSuchSession(_) => {
                AppError::NotFound(message)
            }
            LifecycleError::InvariantViolation(name) => {
                tracing::error!(invariant = name, "Invariant violation: {message}");
                AppError::InternalServerError(message)
            }
            LifecycleError::Gateway(e) => e.into(),
            LifecycleError::Ledger(e) => match e {
                LedgerError::NotFound => AppError::NotFound(message),
                LedgerError::MethodUnsupported(_) => AppError::Conflict {
                    kind: "LedgerMethodUnsupported",
                    message,
                    data: Value::Null,
                },
                LedgerError::Node(ref code) => AppError::Conflict {
                    kind: "LedgerError",
                    message: message.clone(),
                    data: json!({ "code": code }),
                },
                LedgerError::Unreachable(_) | LedgerError::Timeout(_) => {
                    AppError::InternalServerError(message)
                }
            },
            LifecycleError::Storage(_) => AppError::InternalServerError(message),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        let message = format!("{e:#}");
        match e {
            GatewayError::Cancelled => AppError::Conflict {
                kind: "GatewayCancelled",
                message,
                data: Value::Null,
            },
            GatewayError::Expired => AppError::Conflict {
                kind: "GatewayExpired",
                message,
                data: Value::Null,
            },
            GatewayError::Rejected => AppError::Conflict {
                kind: "GatewayRejected",
                message,
                data: Value::Null,
            },
            GatewayError::WrongNetwork { .. } => AppError::BadRequest {
                kind: "WrongNetwork",
                message,
            },
            GatewayError::UnknownPayload(_) => AppError::NotFound(message),
            GatewayError::Provider(_) => AppError::InternalServerError(message),
        }
    }
}
