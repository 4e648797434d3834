mod handlers;
mod server;


pub use server::{router, ApiServer, ApiServerBuilder, ApiState};
