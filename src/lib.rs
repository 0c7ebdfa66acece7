pub mod cmdline;
pub mod error;
pub mod http;
pub mod ids;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod session;
pub mod signaling;
pub mod ws;

pub use error::FabricError;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
