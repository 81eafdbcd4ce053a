mod docs;
mod dto;
mod error;
mod router;
mod routes;
mod state;

pub use dto::{AddOwnerRequest, RestChatRequest};
pub use error::ServerError;
pub use router::{app, serve};
