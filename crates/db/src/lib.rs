pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod services;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
pub use services::{
    CategoryService, CategoryUpdate, RequisitionService, RequisitionSettings, Services,
    TicketService, TicketSettings, TracingAuditSink,
};
