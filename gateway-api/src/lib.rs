mod decode;
mod gateway;
mod middleware;
mod path;
mod response;

pub use gateway::ApiGateway;
pub use response::{ByteRange, ResponseKind};
