pub mod calibration;
pub mod mapper;
pub mod session;
pub mod statistics;
pub mod transport;
