pub mod api;
pub mod client;
pub mod http;
pub mod live;
pub mod loopback;

pub use api::ChatApi;
pub use client::{ChatClient, ClientSettings};
pub use http::RestClient;
pub use live::{LiveChannel, SEND_DESTINATION, Subscription, chatroom_topic};
pub use loopback::LoopbackBroker;
