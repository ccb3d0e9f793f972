/// Debug-stream attachment glue.
pub(crate) mod debug_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// WebSocket connection driving: writer, keep-alive, and read loop.
pub(crate) mod socket_service;
