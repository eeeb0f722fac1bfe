pub mod backend;
pub mod booking_flow;
pub mod flow_store;
pub mod intent;
pub mod settings;
pub mod slots;
