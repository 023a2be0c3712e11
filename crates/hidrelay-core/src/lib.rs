//! HID Relay Core Protocol
//!
//! Transport-independent half of the HID BLE relay. Hosts build typed input events,
//! normalize pointer positions against the visible video rectangle, and encode events
//! into the text wire format, which is chunked to the link's write size. The GATT
//! identifiers shared with the relay peripheral live here too.
//!
//! Nothing in this crate performs I/O; the BLE side lives in `hidrelay-ble`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod chunker;
pub mod encoder;
pub mod errors;
pub mod event;
pub mod geometry;
pub mod protocol;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use chunker::{chunk, chunk_count, Chunks};
pub use encoder::{encode, Encoder, KeyTagStyle, RelayMessage};
pub use errors::{RelayError, Result};
pub use event::{InputEvent, KeyCode, PointerButton, PointerPosition};
pub use geometry::{DisplayRect, NormalizedPoint, Size, NORMALIZED_MAX};
pub use protocol::{
    PeripheralIdentity, ServiceDescriptor, DEFAULT_PERIPHERAL_NAME,
    RELAY_NOTIFY_CHARACTERISTIC_UUID, RELAY_SERVICE_UUID, RELAY_WRITE_CHARACTERISTIC_UUID,
};
