pub mod plugins;
pub mod totp;
