//! HTTP intake for leadcall.
//!
//! A landing page posts `{"name": .., "phone": ..}` to `/submit`; the lead is
//! created and fanned out before the response is written. The server speaks
//! just enough HTTP/1.1 for that: one request per connection, JSON bodies,
//! permissive CORS.

pub mod http;

pub use http::{HttpServeError, HttpServerConfig, MAX_BODY_BYTES, bind, serve_intake};
