//! curl-compatible HTTP client driven by option tokens.
//!
//! A [`Curl`] holds an ordered list of curl command-line options. Executing it
//! interprets the options into a [`RequestDescriptor`], runs the request through
//! a redirect and retry state machine and routes the response to the configured
//! sinks.
//!
//! ```no_run
//! use ocurl::{Curl, Text};
//!
//! let mut curl = Curl::new("https://httpbin.org/post");
//! curl.opt(["-d", "a=1", "-d", "b=2", "-L"]);
//!
//! let execution = curl.exec();
//! let body = execution.stdout(&Text::utf8(), String::new());
//!
//! println!("{:?} {}", execution.status(), body);
//! ```
//!
//! Cookies received along the way land in a jar scoped to the calling thread,
//! so consecutive executions on one thread share a session while other threads
//! never see them.
//!
//! The HTTP/1.1 wire protocol lives in [`proto`], a sans-IO typestate that the
//! default [`TcpTransport`] drives over blocking sockets.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod close_reason;
mod error;

pub mod cookie;
pub mod proto;
pub mod transport;

mod curl;
mod descriptor;
mod exec;
mod io;
mod multipart;
mod options;
mod router;

pub use close_reason::CloseReason;
pub use curl::{Curl, Execution, Raw, Resolver, Text};
pub use descriptor::{Body, FormPart, FormSource, HeaderList, Proxy, RequestDescriptor};
pub use descriptor::{CookieInput, RetryPolicy, Timeouts};
pub use error::Error;
pub use exec::{execute, Hop, ResponseTrace, Terminal, MAX_REDIRECTS};
pub use io::{FileIo, Io, IoMap, MemIo};
pub use multipart::BOUNDARY;
pub use options::{Interpreter, Opt, Rejected, DEFAULT_USER_AGENT};
pub use router::Sinks;
pub use transport::{HopRequest, HopResponse, TcpTransport, Transport};

// Re-export http crate used in public types.
pub use http;
