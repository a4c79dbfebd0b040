mod node_rpc;
mod repository;

pub use node_rpc::*;
pub use repository::*;
