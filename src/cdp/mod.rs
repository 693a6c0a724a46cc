// Chrome DevTools Protocol transport
//
// The driver talks to an already-running browser through its debugging
// endpoint: page discovery over HTTP (/json/version, /json/list), commands
// over a single WebSocket with id-correlated responses. Only the small slice
// of the protocol the page environment needs is implemented: target
// attachment and Runtime.evaluate.

pub mod client;
pub mod protocol;

pub use client::CdpClient;
pub use protocol::{BrowserVersion, CdpErrorResponse, CdpRequest, CdpResponse, PageInfo};
