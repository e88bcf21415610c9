//! Local HTTP API of the autobill service.
//!
//! Consumed by event-source adapters (analysis/events), the companion UI
//! (bills, rules, settings, assets) and the sync trigger. Every response
//! uses the `{code, msg, data}` envelope from `api_types`.

use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

pub use server::{ServerState, run, run_with_listener, spawn_with_listener};

mod analysis;
mod assets;
mod bills;
mod events;
mod rules;
mod server;
mod settings;
mod sync;

pub mod types {
    pub use api_types::ApiResponse;

    pub mod bill {
        pub use api_types::bill::{
            BillListQuery, BillStateChange, BillUpdate, BillView, Deleted, FailView,
        };
    }

    pub mod analysis {
        pub use api_types::analysis::AnalysisQuery;
    }

    pub mod rules {
        pub use api_types::rules::{RetestResult, RulesReplaced};
        pub use engine::RuleSpec;
    }

    pub mod sync {
        pub use api_types::sync::{SyncQueued, SyncRequest};
    }

    pub mod settings {
        pub use api_types::settings::{SettingPut, SettingView};
    }

    pub mod asset {
        pub use engine::Asset;
    }
}

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Parse(_) | EngineError::InvalidAmount(_) | EngineError::InvalidRule(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Classifier(_) | EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg) = match self {
            ServerError::Engine(err) => {
                (status_for_engine_error(&err), message_for_engine_error(err))
            }
            ServerError::Generic(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let envelope = api_types::ApiResponse::<()>::error(status.as_u16(), msg);
        (status, Json(envelope)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_not_found_maps_to_404() {
        let res = ServerError::from(EngineError::KeyNotFound("bill 9".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_parse_maps_to_400() {
        let res = ServerError::from(EngineError::Parse("bad payload".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn engine_invalid_state_maps_to_422() {
        let res =
            ServerError::from(EngineError::InvalidState("Synced -> Edited".to_string()))
                .into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
