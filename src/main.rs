use clap::Parser;
use warp::Filter;

use transport_fabric::cmdline::Opts;
use transport_fabric::registry::Registry;
use transport_fabric::{built_info, http, ws};

#[tokio::main]
async fn main() {
    env_logger::init();
    let opts = Opts::parse();

    log::info!(
        "transport-fabric {} ({}) starting on {}",
        built_info::PKG_VERSION,
        built_info::PROFILE,
        opts.socket_addr()
    );

    let registry = Registry::new();
    let routes = http::routes(registry.clone())
        .or(ws::routes(registry))
        .recover(http::handle_rejection);

    warp::serve(routes).run(opts.socket_addr()).await;
}
