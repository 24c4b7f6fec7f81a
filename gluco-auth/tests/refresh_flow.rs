mod common;

use chrono::Utc;
use common::{seeded_manager, seeded_manager_with, spawn, user, wait_until, Backend};
use gluco_api::Request;
use gluco_auth::{
    authenticate, ApiRequest, AuthError, Credentials, RefreshError, Session, SessionKey,
    SessionManager, Settings, TokenStore,
};
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_parallel_unauthorized_requests_share_one_refresh() {
    let (backend, gate) = Backend::new().gated();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.request(ApiRequest::get("/protected")).await
        }));
    }

    // Hold the refresh until all five callers have joined the cycle
    let coordinator = manager.coordinator().clone();
    wait_until(|| coordinator.pending_len() == 4).await;
    gate.add_permits(1);

    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.hits_with("access-1"), 5);
    assert_eq!(backend.hits_with("access-2"), 5);

    let store = manager.store();
    assert_eq!(store.access_token().await.unwrap().as_deref(), Some("access-2"));
    // Rotated refresh token is persisted too
    assert_eq!(store.refresh_token().await.unwrap().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_queued_callers_resolve_in_fifo_order() {
    let (backend, gate) = Backend::new().gated();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let coordinator = manager.coordinator().clone();

    let leader = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.coordinate_refresh().await })
    };
    wait_until(|| backend.refresh_calls() == 1).await;

    let completed = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for marker in 0..5 {
        let observer = coordinator.clone();
        let coordinator = coordinator.clone();
        let completed = completed.clone();
        waiters.push(tokio::spawn(async move {
            let token = coordinator.coordinate_refresh().await;
            completed.lock().unwrap().push(marker);
            token
        }));
        wait_until(|| observer.pending_len() == marker + 1).await;
    }

    gate.add_permits(1);

    assert_eq!(leader.await.unwrap().unwrap(), "access-2");
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap(), "access-2");
    }
    assert_eq!(*completed.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(backend.refresh_calls(), 1);
    assert!(!coordinator.is_refreshing());
}

#[tokio::test]
async fn test_failed_refresh_rejects_every_caller_and_clears_session() {
    let (mut backend, gate) = Backend::new().gated();
    backend.refresh_failure = Some(StatusCode::UNAUTHORIZED);
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.request(ApiRequest::get("/protected")).await
        }));
    }
    let coordinator = manager.coordinator().clone();
    wait_until(|| coordinator.pending_len() == 2).await;
    gate.add_permits(1);

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.requires_login());
        match err {
            AuthError::SessionInvalidated { status, source } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(matches!(
                    source,
                    RefreshError::Rejected {
                        status: StatusCode::UNAUTHORIZED
                    }
                ));
            }
            other => panic!("expected SessionInvalidated, got {other:?}"),
        }
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(manager.store().load_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_second_unauthorized_is_terminal() {
    let mut backend = Backend::new();
    backend.always_unauthorized = true;
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    let err = manager
        .http_client()
        .request(ApiRequest::get("/protected"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized));
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.hits_with("access-1"), 1);
    assert_eq!(backend.hits_with("access-2"), 1);
}

#[tokio::test]
async fn test_refreshed_token_is_reused_by_later_requests() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    client.request(ApiRequest::get("/protected")).await.unwrap();
    assert_eq!(backend.refresh_calls(), 1);

    // A request issued later with the fresh token needs no refresh at all
    let resp = client.request(ApiRequest::get("/protected")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_other_statuses_pass_through_untouched() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    let resp = manager
        .http_client()
        .request(ApiRequest::get("/teapot"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(resp.text().await.unwrap(), "short and stout");
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_transport_errors_pass_through() {
    // Nothing listens on the discard port
    let manager = seeded_manager("http://127.0.0.1:9").await;

    let err = manager
        .http_client()
        .request(ApiRequest::get("/protected"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Http(_)));
    assert!(manager.store().load_session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_typed_send_decodes_after_refresh() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    let snapshot = manager
        .http_client()
        .send(&Request::dashboard().get())
        .await
        .unwrap();

    assert_eq!(snapshot.glucose.unwrap().value, 6.4);
    assert_eq!(snapshot.health_score, Some(77.0));
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_typed_send_reports_api_errors() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    let err = manager
        .http_client()
        .send(&Request::alerts().acknowledge("missing"))
        .await
        .unwrap_err();

    match err {
        AuthError::Api(api) => assert_eq!(api.status, StatusCode::NOT_FOUND),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_logout_during_refresh_rejects_waiters_and_stays_logged_out() {
    let (backend, gate) = Backend::new().gated();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let request = tokio::spawn(async move { client.request(ApiRequest::get("/protected")).await });
    let coordinator = manager.coordinator().clone();
    wait_until(|| coordinator.is_refreshing()).await;
    wait_until(|| backend.refresh_calls() == 1).await;

    manager.logout().await.unwrap();
    gate.add_permits(1);

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AuthError::SessionInvalidated {
            source: RefreshError::SessionEnded,
            ..
        }
    ));

    // The late refresh must not resurrect the session
    let store = manager.store();
    assert_eq!(store.access_token().await.unwrap(), None);
    assert_eq!(store.load_session().await.unwrap(), None);
    assert!(!coordinator.is_refreshing());
}

#[tokio::test]
async fn test_login_during_refresh_keeps_the_new_session() {
    let (backend, gate) = Backend::new().gated();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let request = tokio::spawn(async move { client.request(ApiRequest::get("/protected")).await });
    let coordinator = manager.coordinator().clone();
    wait_until(|| backend.refresh_calls() == 1).await;

    let credentials = Credentials::new("pat@example.com", "correct-horse");
    manager
        .login(&credentials.email, &credentials.password)
        .await
        .unwrap();
    gate.add_permits(1);

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AuthError::SessionInvalidated {
            source: RefreshError::SessionEnded,
            ..
        }
    ));
    assert!(!coordinator.is_refreshing());

    // The late refresh neither cleared nor overwrote what login stored
    let store = manager.store();
    assert_eq!(
        store.load_session().await.unwrap(),
        Some(Session::new("access-2", "refresh-2"))
    );
    assert_eq!(store.load_user().await.unwrap().unwrap().email, "pat@example.com");

    let resp = manager
        .http_client()
        .request(ApiRequest::get("/protected"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_refresh_timeout_rejects_every_caller_and_clears_session() {
    // The gate is never opened, so the refresh call hangs
    let (backend, _gate) = Backend::new().gated();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager_with(Settings {
        refresh_timeout_secs: Some(1),
        ..Settings::with_server_url(&url)
    })
    .await;
    let client = manager.http_client();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.request(ApiRequest::get("/protected")).await
        }));
    }
    let coordinator = manager.coordinator().clone();
    wait_until(|| coordinator.pending_len() == 2).await;

    for handle in handles {
        match handle.await.unwrap().unwrap_err() {
            AuthError::SessionInvalidated { status, source } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(matches!(source, RefreshError::TimedOut(limit) if limit == Duration::from_secs(1)));
            }
            other => panic!("expected SessionInvalidated, got {other:?}"),
        }
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert!(!coordinator.is_refreshing());
    assert_eq!(coordinator.pending_len(), 0);
    let store = manager.store();
    assert_eq!(store.load_session().await.unwrap(), None);
    assert_eq!(store.load_user().await.unwrap(), None);
}

#[tokio::test]
async fn test_request_replays_with_token_refreshed_meanwhile() {
    let (backend, gate) = Backend::new().gated_requests();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let request = tokio::spawn(async move { client.request(ApiRequest::get("/protected")).await });
    wait_until(|| backend.hits_with("access-1") == 1).await;

    // Another caller stored a new token while this request was on the wire
    manager
        .store()
        .set(SessionKey::AccessToken, "access-2")
        .await
        .unwrap();
    gate.add_permits(2);

    let resp = request.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["token"], "access-2");
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.hits_with("access-2"), 1);
}

#[tokio::test]
async fn test_replay_with_token_refreshed_meanwhile_is_single_shot() {
    let (mut backend, gate) = Backend::new().gated_requests();
    backend.always_unauthorized = true;
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;
    let client = manager.http_client();

    let request = tokio::spawn(async move { client.request(ApiRequest::get("/protected")).await });
    wait_until(|| backend.hits_with("access-1") == 1).await;

    manager
        .store()
        .set(SessionKey::AccessToken, "access-2")
        .await
        .unwrap();
    gate.add_permits(2);

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.hits_with("access-2"), 1);
    // A terminal 401 is reported, the session is left for the caller to end
    assert_eq!(
        manager.store().access_token().await.unwrap().as_deref(),
        Some("access-2")
    );
}

#[tokio::test]
async fn test_restore_refreshes_token_close_to_expiry() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    let mut session = Session::new("access-1", "refresh-1");
    session.expires_hint = Some(Utc::now() + chrono::Duration::seconds(10));
    store.save_session(&session, Some(&user())).await.unwrap();
    let manager =
        SessionManager::with_store(&Settings::with_server_url(&url), store.clone()).unwrap();

    assert_eq!(manager.restore().await.unwrap(), Some(user()));
    assert_eq!(backend.refresh_calls(), 1);

    let restored = store.load_session().await.unwrap().unwrap();
    assert_eq!(restored.access_token, "access-2");
    // The hint from the refresh response replaced the old one
    assert!(!restored.expires_within(chrono::Duration::minutes(5)));

    let resp = manager
        .http_client()
        .request(ApiRequest::get("/protected"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_restore_drops_session_when_early_refresh_fails() {
    let mut backend = Backend::new();
    backend.refresh_failure = Some(StatusCode::UNAUTHORIZED);
    let url = spawn(backend.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    let mut session = Session::new("access-1", "refresh-1");
    session.expires_hint = Some(Utc::now() - chrono::Duration::minutes(1));
    store.save_session(&session, Some(&user())).await.unwrap();
    let manager =
        SessionManager::with_store(&Settings::with_server_url(&url), store.clone()).unwrap();

    assert_eq!(manager.restore().await.unwrap(), None);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(store.load_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_restore_without_expiry_hint_does_not_refresh() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    assert_eq!(manager.restore().await.unwrap(), Some(user()));
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let manager = seeded_manager(&url).await;

    manager.logout().await.unwrap();
    manager.logout().await.unwrap();

    assert_eq!(manager.store().load_session().await.unwrap(), None);
    // Only the first logout had a refresh token to revoke
    assert_eq!(
        backend
            .logout_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn test_login_then_restore() {
    let backend = Backend::new();
    let url = spawn(backend.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    let manager = SessionManager::with_store(&Settings::with_server_url(&url), store).unwrap();

    assert_eq!(manager.restore().await.unwrap(), None);

    let wrong = manager
        .login("pat@example.com", &"nope".to_string().into())
        .await
        .unwrap_err();
    assert!(matches!(wrong, AuthError::LoginRejected(StatusCode::UNAUTHORIZED)));

    let credentials = Credentials::new("pat@example.com", "correct-horse");
    let user = authenticate(&manager, Some(&credentials)).await.unwrap();
    assert_eq!(user.email, "pat@example.com");

    // Second start-up resumes without credentials
    let resumed = authenticate(&manager, None).await.unwrap();
    assert_eq!(resumed, user);

    let resp = manager
        .http_client()
        .request(ApiRequest::get("/protected"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_authenticate_without_session_or_credentials() {
    let manager = SessionManager::with_store(
        &Settings::with_server_url("http://127.0.0.1:9"),
        Arc::new(TokenStore::in_memory()),
    )
    .unwrap();

    let err = authenticate(&manager, None).await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}
