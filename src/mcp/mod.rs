pub mod server;
pub mod socket;

pub use server::ClipwrightMcp;
pub use socket::{run_as_proxy, serve_stdio, start_socket_server, SOCKET_PATH};
