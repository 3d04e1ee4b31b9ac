pub mod gateway;
pub mod prepare_env;

pub use gateway::TestGateway;
