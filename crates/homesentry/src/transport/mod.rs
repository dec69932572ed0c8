pub mod nft;
pub mod push;
pub mod smtp;

pub use nft::NftSetBackend;
pub use push::HttpPushTransport;
pub use smtp::SmtpEmailTransport;
