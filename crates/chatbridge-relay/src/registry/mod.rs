pub mod connection;

pub use connection::{CONSUMER_QUEUE_CAPACITY, ClientRegistry, ConsumerConnection, Outbound};
