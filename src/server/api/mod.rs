pub mod channel_controller;
pub mod health_controller;
pub mod proxy_controller;

pub use channel_controller::ChannelController;
pub use proxy_controller::ProxyController;
