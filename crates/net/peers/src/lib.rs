//! Peer records, seed parsing, membership events and the bounded event bus that
//! carries routing-table membership changes to the peer lifecycle worker.

pub mod address_book;
pub mod bus;
pub mod events;
pub mod record;
pub mod retry;

pub use address_book::{AddressBook, SeedEntry};
pub use bus::{
    DEFAULT_EVENT_BUS_CAPACITY, EventReceiver, EventSink, OverflowPolicy, Publish, event_bus,
};
pub use events::{PeerAction, PeerEvent};
pub use record::{AddressParseError, PeerRecord};
pub use retry::{RetryError, RetryPolicy, retry};
