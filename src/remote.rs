//! # Remote Execution Module / 远程执行模块
//!
//! Everything needed to run the registry inside externally launched drivers:
//! the wire protocol, the coordination server, the browser fallback stage,
//! the relay that ships a driver's output back, and the driver loop itself.
//!
//! 在外部启动的驱动程序中运行注册表所需的一切：传输协议、协调服务器、
//! 浏览器回退阶段、回传输出的转发器以及驱动循环本身。

pub mod browser;
pub mod driver;
pub mod protocol;
pub mod relay;
pub mod server;

pub use driver::{PageContext, drive, drive_page};
pub use server::StepCoordinator;
