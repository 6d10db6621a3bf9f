//! # Event Bus Module
//!
//! Provides the fan-out broker that distributes push messages from the
//! connection's reader task to any number of subscribers.
//!
//! ## Usage
//!
//! ```rust
//! use grblkit_core::event_bus::Broker;
//!
//! let broker: Broker<String> = Broker::new();
//! let (id, mut rx) = broker.subscribe("console", 16);
//!
//! broker.publish("ALARM:1".to_string());
//! assert_eq!(rx.try_recv().unwrap(), "ALARM:1");
//!
//! broker.unsubscribe(id);
//! ```

mod bus;

pub use bus::*;
