mod gateway;
mod wait_group;

pub use gateway::EventGateway;
