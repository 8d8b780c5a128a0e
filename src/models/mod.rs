//! Data models for port and process state.

mod port_status;
mod process_record;

pub use port_status::PortStatus;
pub use process_record::ProcessRecord;
