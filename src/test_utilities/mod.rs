pub mod channel_node;
pub mod mocks;
