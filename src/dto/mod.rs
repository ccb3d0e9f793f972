/// REST request/response bodies.
pub mod api;
/// The `{name, data}` frame envelope shared by events and commands.
pub mod envelope;
/// Reserved `cg_` events and their payloads.
pub mod standard;
