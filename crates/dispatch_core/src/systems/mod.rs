pub mod dispatch;
pub mod driver_agent;
pub mod movement;
pub mod request_inbound;
