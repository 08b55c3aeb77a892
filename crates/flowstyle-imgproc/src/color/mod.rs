mod gray;
pub use gray::gray_from_rgb;
