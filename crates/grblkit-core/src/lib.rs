//! # GrblKit Core
//!
//! Core types shared by the GrblKit crates: the unified error taxonomy and
//! the fan-out broker used to distribute push messages to subscribers.

pub mod error;
pub mod event_bus;

pub use error::{ConnectionError, ControllerError, Error, GcodeError, ProtocolError, Result};

pub use event_bus::{Broker, BrokerConfig, SubscriptionId};
