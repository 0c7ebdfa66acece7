//! CLI / env configuration, trimmed to exactly what the core consumes:
//! `HOST` and `PORT`. TLS termination happens in front of this process, by
//! a reverse proxy or load balancer, so no cert/key flags live here.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "transport-fabric", about = "Robotics/video transport fabric")]
pub struct Opts {
    /// Address to bind the REST and WebSocket listeners on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the REST and WebSocket listeners on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

impl Opts {
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        let ip: std::net::IpAddr = self
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([127, 0, 0, 1]));
        std::net::SocketAddr::new(ip, self.port)
    }
}
