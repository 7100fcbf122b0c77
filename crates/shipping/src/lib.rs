//! Shipping domain module: partial shipments against sales-order
//! allocations, their tracking-event log, and the shipment status machine.

pub mod shipment;
pub mod tracker;

pub use shipment::{
    CarrierId, Shipment, ShipmentEvent, ShipmentId, ShipmentLine, ShipmentStatus,
};
pub use tracker::{
    CreateShipment, CreateShipmentOutcome, NewShipmentLine, RecordShipmentEvent,
    ShipmentCreated, ShipmentEventRecorded, ShipmentStatusChanged, ShipmentTracker,
    ShippingEvent, UpdateShipmentStatus,
};
