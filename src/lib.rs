pub mod server;

/// Endpoint the demo binaries speak to by default.
pub const DEFAULT_URL: &str = "tcp://127.0.0.1:3311";

/// Listen address of the demo server by default.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3311";

/// Banner the demo server greets clients with.
pub const SERVER_BANNER: &str = "callmux-demo 1";

/// Endpoint url for the demo binaries, overridable via `CALLMUX_URL`.
pub fn demo_url() -> String {
    std::env::var("CALLMUX_URL").unwrap_or_else(|_| DEFAULT_URL.to_string())
}
