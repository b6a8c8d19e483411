pub mod annotations;
pub mod chat_room;
pub mod protocol;
pub mod rest;
pub mod router;
pub mod selections;
pub mod state;
pub mod ws_handler;

// Re-export the router builder to make it easily accessible
// to the binary that will serve it.
pub use router::api_router;
