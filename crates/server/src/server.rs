use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use engine::{Engine, IngestHandle, SyncTrigger};

use crate::{analysis, assets, bills, events, rules, settings, sync};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub ingest: IngestHandle,
    pub sync: SyncTrigger,
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/analysis", post(analysis::analyze))
        .route("/events", post(events::enqueue))
        .route("/bills", get(bills::list))
        .route("/bills/pending-edit", get(bills::pending_edit))
        .route("/bills/pending-sync", get(bills::pending_sync))
        .route(
            "/bills/{id}",
            get(bills::get).put(bills::update).delete(bills::delete),
        )
        .route("/bills/{id}/group", get(bills::group))
        .route("/bills/{id}/state", post(bills::change_state))
        .route("/sync", post(sync::trigger))
        .route("/rules", get(rules::list).put(rules::replace))
        .route("/rules/retest", post(rules::retest))
        .route("/settings/{key}", get(settings::get))
        .route("/settings", put(settings::put))
        .route("/assets", get(assets::list).put(assets::replace))
        .with_state(state)
}

pub async fn run(state: ServerState, bind: &str, port: u16) {
    let addr = format!("{bind}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(state, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use api_types::ApiResponse;
    use engine::{
        BillProcessor, DebtSubmission, Dispatcher, EngineConfig, LedgerClient, LedgerError,
        ProcessorConfig, ReimbursementSubmission, WireBill, ingest_channel,
    };

    struct StubLedger;

    #[async_trait]
    impl LedgerClient for StubLedger {
        async fn submit(&self, _bill: &WireBill) -> Result<(), LedgerError> {
            Ok(())
        }

        async fn resolve_account(
            &self,
            _name: &str,
        ) -> Result<Option<engine::LedgerAccount>, LedgerError> {
            Ok(None)
        }

        async fn submit_debt(&self, _submission: &DebtSubmission) -> Result<(), LedgerError> {
            Ok(())
        }

        async fn submit_reimbursement(
            &self,
            _submission: &ReimbursementSubmission,
        ) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    async fn test_router() -> Router {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let engine = Arc::new(
            Engine::builder()
                .database(db)
                .config(EngineConfig::default())
                .build()
                .await
                .unwrap(),
        );

        let (ingest, _queue) = ingest_channel(16);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(StubLedger)));
        let processor =
            BillProcessor::spawn(engine.clone(), dispatcher, ProcessorConfig::default());
        let sync = processor.trigger_handle();
        // Dropping the processor handle detaches the task; the test runtime
        // tears it down.
        drop(processor);

        router(ServerState {
            engine,
            ingest,
            sync,
        })
    }

    fn bank_sms_rules() -> Value {
        json!([{
            "name": "BankSMS",
            "priority": 10,
            "event_scope": "sms",
            "matcher": [
                { "field": "sender", "op": "equals", "value": "95588" },
                { "field": "body", "op": "contains", "value": "消费" }
            ],
            "extractor": {
                "kind": "Expend",
                "money": { "field": "body", "pattern": "消费([0-9,]+\\.?[0-9]*)元" }
            }
        }])
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn analysis_miss_returns_404_envelope() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::post("/analysis?type=sms&app=com.android.mms")
                    .body(Body::from(r#"{"sender":"95588","body":"nothing"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn analysis_match_returns_the_bill() {
        let router = test_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::put("/rules")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(bank_sms_rules().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::post("/analysis?type=sms&app=com.android.mms")
                    .body(Body::from(
                        r#"{"sender":"95588","body":"您尾号1234消费100.00元"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["code"], 200);
        assert_eq!(body["data"]["money_cents"], 10000);
        assert_eq!(body["data"]["kind"], "Expend");
        assert_eq!(body["data"]["state"], "Wait2Edit");
        assert_eq!(body["data"]["matched"], true);
    }

    #[tokio::test]
    async fn analysis_rejects_unknown_event_type() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::post("/analysis?type=carrier-pigeon")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn events_are_accepted_immediately() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::post("/events?type=notice&app=com.example.pay")
                    .body(Body::from(r#"{"title":"pay","text":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["code"], 202);
    }

    #[tokio::test]
    async fn sync_trigger_reports_queued() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::post("/sync")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"force":false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["queued"], true);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let router = test_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::put("/settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"key":"feature.lending","value":"true"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::get("/settings/feature.lending")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["value"], "true");
    }

    #[tokio::test]
    async fn missing_bill_is_a_404_envelope() {
        let router = test_router().await;
        let response = router
            .oneshot(Request::get("/bills/999").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ApiResponse<Value> =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.code, 404);
        assert!(body.data.is_none());
    }

    #[tokio::test]
    async fn assets_replace_and_list() {
        let router = test_router().await;

        let payload = json!([
            { "name": "招商银行", "kind": "bank", "currency": "CNY", "sort": 1 },
            { "name": "现金", "sort": 2 }
        ]);
        let response = router
            .clone()
            .oneshot(
                Request::put("/assets")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/assets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["name"], "招商银行");
    }
}
