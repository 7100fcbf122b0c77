//! Purchasing domain module: the purchase order aggregate and the receiving
//! engine that books incoming goods into the ledger.

pub mod order;
pub mod receiving;

pub use order::{PurchaseOrder, PurchaseOrderId, PurchaseOrderLine, PurchaseOrderStatus};
pub use receiving::{
    CreatePurchaseOrder, NewPurchaseLine, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderStatusChanged, PurchaseReceivingEngine, UpdatePurchaseOrderStatus,
};
