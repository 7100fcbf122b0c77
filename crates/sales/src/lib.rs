//! Sales order domain module: the order aggregate and the fulfillment
//! engine that drives its status machine, reservations and shipments.
//!
//! Pure domain logic; the transactional boundary in `stockflow-infra`
//! commits or discards the mutated aggregates as one unit.

pub mod fulfillment;
pub mod order;

pub use fulfillment::{
    AllocationRequest, CreateSalesOrder, LineFulfillment, NewOrderLine, SalesFulfillmentEngine,
    SalesOrderCreated, SalesOrderEvent, SalesOrderStatusChanged, UpdateSalesOrderStatus,
};
pub use order::{SalesOrder, SalesOrderId, SalesOrderLine, SalesOrderLineId, SalesOrderStatus};
