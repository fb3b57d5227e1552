//! HTTP-level tests for the admin client
//!
//! These verify the token cache, the 401-retry policy, rate-limit
//! pacing, and the pagination contract against a local mock server; no
//! network access is required.

use keycloak_admin::{BackoffPolicy, KeycloakAdminClient, Pager};
use mockito::Matcher;
use std::time::Duration;
use sync_common::{IdentityProvider, SyncError};

const TOKEN_PATH: &str = "/realms/test/protocol/openid-connect/token";

fn token_body(token: &str) -> String {
    format!(
        r#"{{"access_token":"{}","expires_in":300,"token_type":"Bearer"}}"#,
        token
    )
}

fn client_for(server: &mockito::Server) -> KeycloakAdminClient {
    KeycloakAdminClient::new(server.url(), "test", "sync-client", "secret", None).unwrap()
}

#[tokio::test]
async fn access_token_is_cached_across_requests() {
    let mut server = mockito::Server::new_async().await;

    let token_mock = server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .expect(1)
        .create_async()
        .await;

    let users_mock = server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    client.list_users(0, 50).await.unwrap();
    client.list_users(0, 50).await.unwrap();

    // One token exchange serves both requests
    token_mock.assert_async().await;
    users_mock.assert_async().await;
}

#[tokio::test]
async fn second_unauthorized_surfaces_auth_error() {
    let mut server = mockito::Server::new_async().await;

    // One initial exchange plus exactly one refresh after the 401
    let token_mock = server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .expect(2)
        .create_async()
        .await;

    let users_mock = server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let result = client.list_users(0, 50).await;

    assert!(matches!(result, Err(SyncError::Auth(_))));
    token_mock.assert_async().await;
    users_mock.assert_async().await;
}

#[tokio::test]
async fn uncoverable_retry_after_surfaces_rate_limit_immediately() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    // The server asks for a wait far beyond any sane budget
    let users_mock = server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "3600")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    match client.list_users(0, 10).await {
        Err(SyncError::RateLimited { retry_after }) => assert_eq!(retry_after, Some(3600)),
        other => panic!("expected rate-limit error, got {:?}", other),
    }
    // No pointless shorter sleep and re-attempt happened
    users_mock.assert_async().await;
}

#[tokio::test]
async fn persistent_rate_limiting_stops_when_the_budget_is_spent() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    let users_mock = server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(3)
        .create_async()
        .await;

    // Budget covers two synthesized delays (2ms + 4ms), not the third
    let client = client_for(&server).with_backoff(BackoffPolicy {
        wait_budget: Duration::from_millis(7),
        base_delay: Duration::from_millis(2),
    });

    assert!(matches!(
        client.list_users(0, 10).await,
        Err(SyncError::RateLimited { .. })
    ));
    users_mock.assert_async().await;
}

#[tokio::test]
async fn pagination_drains_until_short_page() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("first".into(), "0".into()),
            Matcher::UrlEncoded("max".into(), "2".into()),
            Matcher::UrlEncoded("briefRepresentation".into(), "false".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"id":"u1","username":"a","enabled":true},
                {"id":"u2","username":"b","enabled":true}]"#,
        )
        .create_async()
        .await;

    server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("first".into(), "2".into()),
            Matcher::UrlEncoded("max".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"u3","username":"c","enabled":true}]"#)
        .create_async()
        .await;

    let client = client_for(&server);

    let mut usernames = Vec::new();
    let mut pager = Pager::new(2);
    loop {
        let page = client.list_users(pager.first(), pager.max()).await.unwrap();
        let fetched = page.len();
        usernames.extend(page.into_iter().map(|u| u.username));
        if !pager.advance(fetched) {
            break;
        }
    }

    // No items lost or duplicated
    assert_eq!(usernames, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn create_user_parses_location_header() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    let location = format!("{}/admin/realms/test/users/new-id-123", server.url());
    server
        .mock("POST", "/admin/realms/test/users")
        .with_status(201)
        .with_header("location", &location)
        .create_async()
        .await;

    let client = client_for(&server);
    let user = sync_common::IdpUser {
        username: "alice".into(),
        email: Some("alice@example.org".into()),
        enabled: true,
        ..Default::default()
    };

    let id = client.create_user(&user).await.unwrap();
    assert_eq!(id, "new-id-123");
}

#[tokio::test]
async fn non_success_status_surfaces_remote_error() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    server
        .mock("GET", "/admin/realms/test/users")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("upstream broke")
        .create_async()
        .await;

    let client = client_for(&server);
    match client.list_users(0, 10).await {
        Err(SyncError::Remote { status, message }) => {
            assert_eq!(status, 502);
            assert!(message.contains("upstream broke"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn group_tree_flattens_in_preorder() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    server
        .mock("GET", "/admin/realms/test/groups")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id":"g1","name":"classes","path":"/classes","subGroups":[
                    {"id":"g2","name":"10a","path":"/classes/10a","subGroups":[]},
                    {"id":"g3","name":"10b","path":"/classes/10b","subGroups":[]}
                ]},
                {"id":"g4","name":"projects","path":"/projects","subGroups":[]}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let flat = client.list_groups_flat().await.unwrap();

    let names: Vec<&str> = flat.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["classes", "10a", "10b", "projects"]);
    assert_eq!(flat[1].parent_id.as_deref(), Some("g1"));
    assert!(flat.iter().all(|g| g.sub_groups.is_empty()));
}

#[tokio::test]
async fn user_groups_are_listed() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    server
        .mock("GET", "/admin/realms/test/users/u1/groups")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"g1","name":"10a","path":"/classes/10a"}]"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let groups = client.user_groups("u1").await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "10a");
}

#[tokio::test]
async fn membership_mutations_hit_expected_paths() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok"))
        .create_async()
        .await;

    let put_mock = server
        .mock("PUT", "/admin/realms/test/users/u1/groups/g1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let delete_mock = server
        .mock("DELETE", "/admin/realms/test/users/u1/groups/g1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    client.add_user_to_group("u1", "g1").await.unwrap();
    client.remove_user_from_group("u1", "g1").await.unwrap();

    put_mock.assert_async().await;
    delete_mock.assert_async().await;
}
