mod fixture;

use fixture::TestServer;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use transport_fabric::ids::Protocol;
use transport_fabric::registry::CreateRoomOptions;

async fn join(url: &str, participant_id: &str, role: &str) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let (mut socket, _) = connect_async(url).await.expect("ws connect");
    let join = serde_json::json!({ "participant_id": participant_id, "role": role });
    socket
        .send(WsMessage::Text(join.to_string()))
        .await
        .unwrap();
    let ack = socket.next().await.unwrap().unwrap();
    let ack: serde_json::Value = serde_json::from_str(ack.to_text().unwrap()).unwrap();
    assert_eq!(ack["type"], "joined");
    socket
}

#[tokio::test]
async fn producer_joint_update_reaches_consumer_but_not_itself() {
    let server = TestServer::spawn().await;
    server
        .registry
        .create_room(
            "fleet".into(),
            Protocol::Robotics,
            CreateRoomOptions {
                room_id: Some("bay-1".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let url = server.ws_url("/robotics/workspaces/fleet/rooms/bay-1/ws");
    let mut producer = join(&url, "arm-1", "producer").await;
    let mut consumer = join(&url, "operator-1", "consumer").await;

    let update = serde_json::json!({
        "type": "joint_update",
        "data": [{"name": "shoulder", "value": 12.5}],
    });
    producer.send(WsMessage::Text(update.to_string())).await.unwrap();

    let received = consumer.next().await.unwrap().unwrap();
    let received: serde_json::Value = serde_json::from_str(received.to_text().unwrap()).unwrap();
    assert_eq!(received["type"], "joint_update");
    assert_eq!(received["data"][0]["name"], "shoulder");

    // The producer never receives its own traffic echoed back: the next
    // frame from the room (if any) would not be this joint_update.
    producer.close(None).await.unwrap();
    consumer.close(None).await.unwrap();
}

#[tokio::test]
async fn second_producer_is_rejected_with_error_frame() {
    let server = TestServer::spawn().await;
    server
        .registry
        .create_room(
            "fleet".into(),
            Protocol::Robotics,
            CreateRoomOptions {
                room_id: Some("bay-2".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let url = server.ws_url("/robotics/workspaces/fleet/rooms/bay-2/ws");

    let _first = join(&url, "arm-1", "producer").await;

    let (mut second, _) = connect_async(&url).await.unwrap();
    let join_req = serde_json::json!({ "participant_id": "arm-2", "role": "producer" });
    second
        .send(WsMessage::Text(join_req.to_string()))
        .await
        .unwrap();
    let reply = second.next().await.unwrap().unwrap();
    let reply: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "error");
}

#[tokio::test]
async fn emergency_stop_reaches_every_other_participant() {
    let server = TestServer::spawn().await;
    server
        .registry
        .create_room(
            "fleet".into(),
            Protocol::Robotics,
            CreateRoomOptions {
                room_id: Some("bay-3".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let url = server.ws_url("/robotics/workspaces/fleet/rooms/bay-3/ws");

    let mut producer = join(&url, "arm-1", "producer").await;
    let mut consumer_a = join(&url, "operator-a", "consumer").await;
    let mut consumer_b = join(&url, "operator-b", "consumer").await;

    let stop = serde_json::json!({ "type": "emergency_stop", "reason": "operator halt" });
    consumer_a.send(WsMessage::Text(stop.to_string())).await.unwrap();

    let at_producer = producer.next().await.unwrap().unwrap();
    let at_producer: serde_json::Value =
        serde_json::from_str(at_producer.to_text().unwrap()).unwrap();
    assert_eq!(at_producer["type"], "emergency_stop");

    let at_b = consumer_b.next().await.unwrap().unwrap();
    let at_b: serde_json::Value = serde_json::from_str(at_b.to_text().unwrap()).unwrap();
    assert_eq!(at_b["type"], "emergency_stop");
}
