//! 平台与进程级支撑

pub mod logging;
