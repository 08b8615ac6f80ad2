pub mod category;
pub mod priority;
pub mod requisition;
pub mod ticket;
