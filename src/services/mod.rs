pub mod cipher;
pub mod group_service;
pub mod message_service;

pub use cipher::MessageCipher;
pub use group_service::GroupService;
pub use message_service::MessagePipeline;
