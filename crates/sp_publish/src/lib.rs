pub mod thumbnail;
pub mod x_client;

pub use thumbnail::CardRenderer;
pub use x_client::XClient;
