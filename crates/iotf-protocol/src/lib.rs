pub mod limits;
pub mod qos;
pub mod topics;

pub use limits::*;
pub use qos::*;
pub use topics::{CommandTopic, EventTopic, InboundTopic, TopicError};
