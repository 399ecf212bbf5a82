pub mod export;
pub mod wait;
