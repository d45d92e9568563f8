#![crate_name = "ofp_core"]
#![crate_type = "lib"]

pub mod bits;
pub mod buffer_pool;
pub mod error;
pub mod message_stream;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow0x01;
pub mod switch_manager;

pub use crate::message_stream::{MessageStream, StreamHandle};
pub use crate::switch_manager::{DatapathId, Switch, SwitchManager, SwitchMsg};
