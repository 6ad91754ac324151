//! Debug tools for rkfusion - TCP query server for remote inspection and
//! control of a running fusion engine
//!
//! Start the debug server in your app:
//! ```ignore
//! let handler = Arc::new(Mutex::new(MyHandler::new()));
//! let _server = DebugServer::start(handler, DEFAULT_PORT);
//! ```

pub mod encode;
pub mod protocol;
pub mod server;

pub use encode::{encode_png_base64, EncodeError};
pub use protocol::*;
pub use server::{respond, DebugHandler, DebugServer};

/// Default debug server port
pub const DEFAULT_PORT: u16 = 9742;
