mod fixture;

use transport_fabric::registry::{CreateRoomOptions, Registry};
use transport_fabric::{http, ws};
use warp::http::StatusCode;
use warp::Filter;

fn app(registry: Registry) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    http::routes(registry.clone())
        .or(ws::routes(registry))
        .recover(http::handle_rejection)
}

#[tokio::test]
async fn health_reports_ok() {
    let filter = app(Registry::new());
    let resp = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn create_list_and_get_room_roundtrip() {
    let registry = Registry::new();
    let filter = app(registry);

    let create = warp::test::request()
        .method("POST")
        .path("/robotics/workspaces/acme/rooms")
        .json(&serde_json::json!({ "room_id": "bay-1" }))
        .reply(&filter)
        .await;
    assert_eq!(create.status(), StatusCode::OK);

    let list = warp::test::request()
        .path("/robotics/workspaces/acme/rooms")
        .reply(&filter)
        .await;
    assert_eq!(list.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(list.body()).unwrap();
    assert_eq!(body["total"], 1);

    let info = warp::test::request()
        .path("/robotics/workspaces/acme/rooms/bay-1")
        .reply(&filter)
        .await;
    assert_eq!(info.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(info.body()).unwrap();
    assert_eq!(body["room"]["room_id"], "bay-1");
    assert_eq!(body["room"]["consumer_count"], 0);
}

#[tokio::test]
async fn creating_duplicate_room_is_conflict() {
    let registry = Registry::new();
    let filter = app(registry);

    let first = warp::test::request()
        .method("POST")
        .path("/robotics/workspaces/acme/rooms")
        .json(&serde_json::json!({ "room_id": "dup" }))
        .reply(&filter)
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = warp::test::request()
        .method("POST")
        .path("/robotics/workspaces/acme/rooms")
        .json(&serde_json::json!({ "room_id": "dup" }))
        .reply(&filter)
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn getting_unknown_room_is_not_found() {
    let registry = Registry::new();
    let filter = app(registry);

    let resp = warp::test::request()
        .path("/robotics/workspaces/acme/rooms/ghost")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_room_is_idempotent() {
    let registry = Registry::new();
    registry
        .create_room(
            "acme".into(),
            transport_fabric::ids::Protocol::Video,
            CreateRoomOptions {
                room_id: Some("cam-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let filter = app(registry);

    let first = warp::test::request()
        .method("DELETE")
        .path("/video/workspaces/acme/rooms/cam-1")
        .reply(&filter)
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = warp::test::request()
        .method("DELETE")
        .path("/video/workspaces/acme/rooms/cam-1")
        .reply(&filter)
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(second.body()).unwrap();
    assert_eq!(body["message"], "room did not exist");
}
