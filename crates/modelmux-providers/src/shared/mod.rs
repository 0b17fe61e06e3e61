pub mod http_client;
pub mod response_parser;

pub use http_client::*;
pub use response_parser::*;
