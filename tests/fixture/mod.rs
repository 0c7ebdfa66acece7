use std::net::SocketAddr;

use transport_fabric::registry::{CreateRoomOptions, Registry};
use transport_fabric::{http, ws};
use warp::Filter;

/// A running instance of the fabric bound to an ephemeral localhost port,
/// for tests that need a real socket (WebSocket upgrades in particular).
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Registry,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let registry = Registry::new();
        let routes = http::routes(registry.clone())
            .or(ws::routes(registry.clone()))
            .recover(http::handle_rejection);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        TestServer { addr, registry }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub fn create_room_options() -> CreateRoomOptions {
    CreateRoomOptions::default()
}
