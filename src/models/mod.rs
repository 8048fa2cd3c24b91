//! 数据模型模块

mod alert;
mod notification;
mod reading;
mod thresholds;

pub use alert::*;
pub use notification::*;
pub use reading::*;
pub use thresholds::*;
