//! HTTP control surface for channel workers
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `GET /health` | health and build info |
//! | `GET /channels` | active channels |
//! | `POST /channels/:id/start` | start a channel |
//! | `DELETE /channels/:id` | stop a channel |
//! | `POST /channels/:id/queue` | enqueue a request |
//! | `GET /channels/:id/queue` | queue snapshot |
//! | `POST /channels/:id/skip` | skip items |
//! | `POST /channels/:id/clear` | clear the channel |
//! | `GET /channels/:id/events` | SSE event stream |

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, AppContext};
