pub mod device;
pub mod inspect;
pub mod password;
